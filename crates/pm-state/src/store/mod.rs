use crate::action::Action;

mod console;
mod login;
mod platforms;
mod session;

pub use console::{ConsoleStore, MAX_EXCHANGE_LOG};
pub use login::LoginFormStore;
pub use platforms::{AgentRecord, PlatformStore, PlatformView};
pub use session::{fragment_for_page, page_from_fragment, SessionStore, DEFAULT_PAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreId {
    Session,
    Platforms,
    LoginForm,
    Console,
}

impl StoreId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Session => "session",
            StoreId::Platforms => "platforms",
            StoreId::LoginForm => "login_form",
            StoreId::Console => "console",
        }
    }
}

/// Which stores an action actually changed, in the order they were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changed: Vec<StoreId>,
    /// Set when an unauthorized failure cleared the session token.
    pub deauthorized: bool,
}

impl ChangeSet {
    fn mark(&mut self, store: StoreId) {
        if !self.changed.contains(&store) {
            self.changed.push(store);
        }
    }

    pub fn contains(&self, store: StoreId) -> bool {
        self.changed.contains(&store)
    }

    pub fn stores(&self) -> &[StoreId] {
        &self.changed
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// The single authoritative copy of client state.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    session: SessionStore,
    platforms: PlatformStore,
    login_form: LoginFormStore,
    console: ConsoleStore,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE)
    }
}

impl AppState {
    pub fn new(page: impl Into<String>) -> Self {
        let session = SessionStore::new(page);
        let console = ConsoleStore::new(&session);
        Self {
            session,
            platforms: PlatformStore::default(),
            login_form: LoginFormStore::default(),
            console,
        }
    }

    /// Starts from a token obtained earlier, e.g. passed on the command line.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.session.restore(authorization);
        self.console = ConsoleStore::new(&self.session);
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn platforms(&self) -> &PlatformStore {
        &self.platforms
    }

    pub fn login_form(&self) -> &LoginFormStore {
        &self.login_form
    }

    pub fn console(&self) -> &ConsoleStore {
        &self.console
    }

    /// Applies one action to every store. The session store goes first so
    /// the console sees the updated token and page.
    pub fn apply(&mut self, action: &Action) -> ChangeSet {
        let mut changes = ChangeSet::default();

        if let Action::ReceiveUnauthorized { authorization, .. } = action {
            if !self.session.accepts_unauthorized(authorization.as_deref()) {
                return changes;
            }
        }

        if self.session.apply(action, &mut changes.deauthorized) {
            changes.mark(StoreId::Session);
        }
        if self.platforms.apply(action) {
            changes.mark(StoreId::Platforms);
        }
        if self.login_form.apply(action) {
            changes.mark(StoreId::LoginForm);
        }
        if self.console.apply(action, &self.session) {
            changes.mark(StoreId::Console);
        }
        changes
    }
}
