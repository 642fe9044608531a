//! Connected machine context
//!
//! Built once by the caller and handed to the client; the control layer
//! only ever reads it.

use serde::{Deserialize, Serialize};

/// A machine whose API the panel is talking to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedMachine {
    pub name: String,
    pub base_url: String,
}

impl ConnectedMachine {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MachineContext {
    machine: Option<ConnectedMachine>,
    token: Option<String>,
}

impl MachineContext {
    pub fn connected(machine: ConnectedMachine, token: Option<String>) -> Self {
        Self {
            machine: Some(machine),
            token,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.machine
            .as_ref()
            .map_or(false, |m| !m.base_url.trim().is_empty())
    }

    pub fn machine(&self) -> Option<&ConnectedMachine> {
        self.machine.as_ref()
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> Option<&str> {
        if !self.is_connected() {
            return None;
        }
        self.machine
            .as_ref()
            .map(|m| m.base_url.trim().trim_end_matches('/'))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl std::fmt::Debug for MachineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineContext")
            .field("machine", &self.machine)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let ctx = MachineContext::connected(ConnectedMachine::new("box", "http://box:3000/"), None);
        assert!(ctx.is_connected());
        assert_eq!(ctx.base_url(), Some("http://box:3000"));
    }

    #[test]
    fn test_blank_url_is_not_connected() {
        let ctx = MachineContext::connected(ConnectedMachine::new("box", "  "), None);
        assert!(!ctx.is_connected());
        assert_eq!(ctx.base_url(), None);
        assert!(!MachineContext::disconnected().is_connected());
    }

    #[test]
    fn test_debug_redacts_token() {
        let ctx = MachineContext::connected(
            ConnectedMachine::new("box", "http://box"),
            Some("secret-token".to_string()),
        );
        let printed = format!("{:?}", ctx);
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("<redacted>"));
    }
}
