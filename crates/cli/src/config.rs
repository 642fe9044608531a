//! CLI configuration
//!
//! Loaded from `~/.tsm/config.toml`. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tsm_common::{Error, Result};
use tsm_control::DEFAULT_SELF_MANAGED_SERVICE;

/// A known machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    pub name: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Machine used when `--machine` is not given
    pub default_machine: Option<String>,

    /// Bearer token for the machine API
    pub token: Option<String>,

    /// Unit that runs the machine API; toggles on it always restart
    pub self_managed_service: String,

    /// Log follow interval
    pub log_poll_interval_ms: u64,

    /// Client-side request timeout; unset keeps the transport default
    pub request_timeout_secs: Option<u64>,

    /// Machine registry
    pub machines: Vec<MachineEntry>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_machine: None,
            token: None,
            self_managed_service: DEFAULT_SELF_MANAGED_SERVICE.to_string(),
            log_poll_interval_ms: 1000,
            request_timeout_secs: None,
            machines: Vec::new(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("log_poll_interval_ms must be positive".to_string()));
        }
        if self.self_managed_service.trim().is_empty() {
            return Err(Error::InvalidConfig("self_managed_service is empty".to_string()));
        }
        for (i, machine) in self.machines.iter().enumerate() {
            if self.machines[..i].iter().any(|m| m.name == machine.name) {
                return Err(Error::InvalidConfig(format!("machine '{}' is listed twice", machine.name)));
            }
        }
        Ok(())
    }

    pub fn machine(&self, name: &str) -> Option<&MachineEntry> {
        self.machines.iter().find(|m| m.name == name)
    }

    /// Registry entry for `requested`, falling back to `default_machine`
    ///
    /// `Ok(None)` when nothing is requested and no default is set.
    pub fn select_machine(&self, requested: Option<&str>) -> Result<Option<&MachineEntry>> {
        match requested.or(self.default_machine.as_deref()) {
            Some(name) => self
                .machine(name)
                .map(Some)
                .ok_or_else(|| Error::MachineNotFound(name.to_string())),
            None => Ok(None),
        }
    }

    /// Make `name` the default machine
    pub fn use_machine(&mut self, name: &str) -> Result<()> {
        if self.machine(name).is_none() {
            return Err(Error::MachineNotFound(name.to_string()));
        }
        self.default_machine = Some(name.to_string());
        Ok(())
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
