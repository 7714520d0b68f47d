use crate::action::Action;

/// Page shown before any navigation, the empty fragment.
pub const DEFAULT_PAGE: &str = "";

/// `"#platforms"` and `"platforms"` both name the `platforms` page.
pub fn page_from_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim();
    trimmed.strip_prefix('#').unwrap_or(trimmed).to_string()
}

pub fn fragment_for_page(page: &str) -> String {
    format!("#{page}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    authorization: Option<String>,
    page: String,
}

impl SessionStore {
    pub(crate) fn new(page: impl Into<String>) -> Self {
        Self {
            authorization: None,
            page: page.into(),
        }
    }

    pub(crate) fn restore(&mut self, authorization: Option<String>) {
        self.authorization = authorization.filter(|token| !token.trim().is_empty());
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn fragment(&self) -> String {
        fragment_for_page(&self.page)
    }

    /// An unauthorized failure counts only if it was a login attempt or was
    /// issued with the token that is still current.
    pub(crate) fn accepts_unauthorized(&self, issued_with: Option<&str>) -> bool {
        match issued_with {
            None => true,
            Some(token) => self.authorization.as_deref() == Some(token),
        }
    }

    pub(crate) fn apply(&mut self, action: &Action, deauthorized: &mut bool) -> bool {
        match action {
            Action::ReceiveAuthorization { authorization } => {
                if self.authorization.as_deref() == Some(authorization.as_str()) {
                    return false;
                }
                self.authorization = Some(authorization.clone());
                true
            }
            Action::ReceiveUnauthorized { authorization, .. } => {
                if authorization.is_none() || self.authorization.is_none() {
                    return false;
                }
                self.authorization = None;
                *deauthorized = true;
                true
            }
            Action::ClearAuthorization => self.authorization.take().is_some(),
            Action::ChangePage { page } => {
                if self.page == *page {
                    return false;
                }
                self.page = page.clone();
                true
            }
            _ => false,
        }
    }
}
