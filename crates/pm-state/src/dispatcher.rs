use crate::action::{Action, ActionKind};
use crate::store::{AppState, ChangeSet, StoreId};
use pm_client::{ExchangeEvent, ExchangeListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Changed { store: StoreId, action: ActionKind },
    /// The session token was cleared by an unauthorized failure.
    Deauthorized,
}

struct DispatcherInner {
    state: RwLock<AppState>,
    events: broadcast::Sender<StoreEvent>,
    generation: AtomicU64,
}

/// Serializes every state mutation. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("generation", &self.inner.generation.load(Ordering::Relaxed))
            .field("subscribers", &self.inner.events.receiver_count())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl Dispatcher {
    pub fn new(state: AppState) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                state: RwLock::new(state),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Applies `action` to the state and publishes one event per changed
    /// store. Events for one action are sent after the write lock is released.
    pub fn dispatch(&self, action: Action) -> ChangeSet {
        let kind = action.kind();
        let changes = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            state.apply(&action)
        };

        debug!(
            event = "dispatch",
            action = kind.as_str(),
            changed = changes.stores().len()
        );
        if changes.deauthorized {
            info!(event = "session_deauthorized", action = kind.as_str());
            let _ = self.inner.events.send(StoreEvent::Deauthorized);
        }
        for store in changes.stores() {
            let _ = self.inner.events.send(StoreEvent::Changed {
                store: *store,
                action: kind,
            });
        }
        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Runs `read` against the current state under the read lock.
    pub fn read<R>(&self, read: impl FnOnce(&AppState) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        read(&*state)
    }

    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    pub fn authorization(&self) -> Option<String> {
        self.read(|state| state.session().authorization().map(str::to_string))
    }

    /// Monotonic stamp for start/stop requests and status fetches.
    pub fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl ExchangeListener for Dispatcher {
    fn on_exchange(&self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Started(exchange) => {
                self.dispatch(Action::MakeRequest(exchange));
            }
            ExchangeEvent::Settled(exchange) => {
                self.dispatch(Action::settled(exchange));
            }
        }
    }
}
