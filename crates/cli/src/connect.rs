//! Turning configuration and flags into a machine connection

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;
use tsm_control::{ActionResolver, ConnectedMachine, ControlSession, MachineContext, RemoteActionClient};

use crate::config::CliConfig;

/// Connection-related global flags plus the loaded config
#[derive(Clone)]
pub struct Connection {
    pub config: CliConfig,
    pub config_path: PathBuf,
    pub machine: Option<String>,
    pub url: Option<String>,
    pub token: Option<String>,
}

impl Connection {
    pub fn load(
        config_path: PathBuf,
        machine: Option<String>,
        url: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let config = CliConfig::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        Ok(Self {
            config,
            config_path,
            machine,
            url,
            token,
        })
    }

    /// `--url` wins over `--machine`, which wins over `default_machine`
    ///
    /// Resolves to a disconnected context when nothing is selected.
    pub fn context(&self) -> Result<MachineContext> {
        let token = self.token.clone().or_else(|| self.config.token.clone());

        if let Some(url) = &self.url {
            let machine = ConnectedMachine::new(url.clone(), url.clone());
            return Ok(MachineContext::connected(machine, token));
        }

        match self.config.select_machine(self.machine.as_deref())? {
            Some(entry) => {
                debug!("Using machine {} at {}", entry.name, entry.base_url);
                let machine = ConnectedMachine::new(entry.name.clone(), entry.base_url.clone());
                Ok(MachineContext::connected(machine, token))
            }
            None => Ok(MachineContext::disconnected()),
        }
    }

    pub fn client(&self) -> Result<RemoteActionClient> {
        let client = RemoteActionClient::http(self.context()?, self.config.request_timeout())
            .context("Failed to build HTTP client")?;
        Ok(client)
    }

    pub fn session(&self) -> Result<ControlSession> {
        let resolver = ActionResolver::new(self.config.self_managed_service.clone());
        Ok(ControlSession::new(self.client()?, resolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineEntry;

    fn connection(machine: Option<&str>, url: Option<&str>) -> Connection {
        Connection {
            config: CliConfig {
                default_machine: Some("prod".to_string()),
                token: Some("from-config".to_string()),
                machines: vec![MachineEntry {
                    name: "prod".to_string(),
                    base_url: "https://prod.example.com".to_string(),
                }],
                ..Default::default()
            },
            config_path: PathBuf::from("/nonexistent/config.toml"),
            machine: machine.map(str::to_string),
            url: url.map(str::to_string),
            token: None,
        }
    }

    #[test]
    fn test_default_machine_is_used() {
        let ctx = connection(None, None).context().unwrap();
        assert_eq!(ctx.base_url(), Some("https://prod.example.com"));
        assert_eq!(ctx.token(), Some("from-config"));
    }

    #[test]
    fn test_url_bypasses_registry() {
        let ctx = connection(Some("nope"), Some("http://127.0.0.1:3000")).context().unwrap();
        assert_eq!(ctx.base_url(), Some("http://127.0.0.1:3000"));
    }

    #[test]
    fn test_unknown_machine_is_an_error() {
        assert!(connection(Some("nope"), None).context().is_err());
    }

    #[test]
    fn test_flag_token_wins() {
        let mut conn = connection(None, None);
        conn.token = Some("from-flag".to_string());
        assert_eq!(conn.context().unwrap().token(), Some("from-flag"));
    }

    #[test]
    fn test_nothing_selected_is_disconnected() {
        let mut conn = connection(None, None);
        conn.config.default_machine = None;
        assert!(!conn.context().unwrap().is_connected());
    }
}
