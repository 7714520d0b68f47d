use super::SessionStore;
use crate::action::Action;
use pm_client::Exchange;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Oldest exchanges are dropped past this many.
pub const MAX_EXCHANGE_LOG: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleStore {
    composer_id: u64,
    composer_value: String,
    shown: bool,
    exchanges: VecDeque<Exchange>,
}

impl ConsoleStore {
    pub(crate) fn new(session: &SessionStore) -> Self {
        let mut store = Self {
            composer_id: 0,
            composer_value: String::new(),
            shown: false,
            exchanges: VecDeque::new(),
        };
        store.reset_composer(session, false);
        store
    }

    /// Bumped whenever the composer text is regenerated, so a front-end can
    /// drop whatever the user was editing.
    pub fn composer_id(&self) -> u64 {
        self.composer_id
    }

    pub fn composer_value(&self) -> &str {
        &self.composer_value
    }

    pub fn composer_is_valid(&self) -> bool {
        serde_json::from_str::<Value>(&self.composer_value).is_ok()
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn exchange(&self, id: &str) -> Option<&Exchange> {
        self.exchanges.iter().find(|exchange| exchange.id == id)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    pub(crate) fn apply(&mut self, action: &Action, session: &SessionStore) -> bool {
        match action {
            Action::ToggleConsole => {
                self.shown = !self.shown;
                true
            }
            Action::UpdateComposerValue { value } => {
                if self.composer_value == *value {
                    return false;
                }
                self.composer_value = value.clone();
                true
            }
            Action::ReceiveAuthorization { .. }
            | Action::ReceiveUnauthorized { .. }
            | Action::ClearAuthorization => {
                self.composer_id += 1;
                self.reset_composer(session, false);
                true
            }
            Action::ChangePage { .. } => {
                self.composer_id += 1;
                self.reset_composer(session, true);
                true
            }
            Action::MakeRequest(exchange) => {
                if self.exchange(&exchange.id).is_some() {
                    return false;
                }
                self.push(exchange.clone());
                true
            }
            Action::ReceiveResponse(exchange) | Action::FailRequest(exchange) => {
                match self
                    .exchanges
                    .iter()
                    .position(|logged| logged.id == exchange.id)
                {
                    Some(index) => self.exchanges[index].absorb(exchange),
                    None => {
                        self.push(exchange.clone());
                        true
                    }
                }
            }
            _ => false,
        }
    }

    fn push(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > MAX_EXCHANGE_LOG {
            self.exchanges.pop_front();
        }
    }

    /// Keeps whatever the user typed if it still parses, stamps the current
    /// token, and optionally points `method` at the current page.
    fn reset_composer(&mut self, session: &SessionStore, update_method: bool) {
        let page = Value::String(session.page().to_string());
        let mut object = match serde_json::from_str::<Value>(&self.composer_value) {
            Ok(Value::Object(mut object)) => {
                if update_method {
                    object.insert("method".to_string(), page);
                }
                object
            }
            _ => {
                let mut object = Map::new();
                object.insert("method".to_string(), page);
                object
            }
        };
        match session.authorization() {
            Some(token) => {
                object.insert(
                    "authorization".to_string(),
                    Value::String(token.to_string()),
                );
            }
            None => {
                object.remove("authorization");
            }
        }
        self.composer_value = pretty(&Value::Object(object));
    }
}

fn pretty(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}
