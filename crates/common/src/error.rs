//! Error types for local TSM failures
//!
//! Failures reported by a remote machine never use this type; they are
//! classified into `tsm_control::RemoteError` instead.

use thiserror::Error;

/// Result type alias using TSM Error
pub type Result<T> = std::result::Result<T, Error>;

/// Local error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Machine not found: {0}")]
    MachineNotFound(String),
}
