use crate::action::Action;
use pm_core::jsonrpc::RpcErrorObject;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginFormStore {
    last_error: Option<RpcErrorObject>,
}

impl LoginFormStore {
    pub fn last_error(&self) -> Option<&RpcErrorObject> {
        self.last_error.as_ref()
    }

    pub(crate) fn apply(&mut self, action: &Action) -> bool {
        match action {
            Action::ReceiveAuthorization { .. } => self.last_error.take().is_some(),
            Action::ReceiveUnauthorized { error, .. } => {
                if self.last_error.as_ref() == Some(error) {
                    return false;
                }
                self.last_error = Some(error.clone());
                true
            }
            _ => false,
        }
    }
}
