//! Error taxonomy surfaced to callers of the control layer

use serde::Serialize;
use thiserror::Error;
use tsm_common::ApiErrorBody;

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No machine is connected; nothing was sent
    NoMachineConnected,
    /// Bad input or state detected locally before dispatch
    Validation,
    /// The machine ran the request and reported a structured failure
    RemoteExecution,
    /// Transport failure, no response received
    Network,
    /// A response arrived but was non-standard or malformed
    Unexpected,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErrorKind::NoMachineConnected => write!(f, "no machine connected"),
            RemoteErrorKind::Validation => write!(f, "validation"),
            RemoteErrorKind::RemoteExecution => write!(f, "remote execution"),
            RemoteErrorKind::Network => write!(f, "network"),
            RemoteErrorKind::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// A failed remote operation, ready for presentation
///
/// `http_status` is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("[{code}] {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub http_status: u16,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, code: impl Into<String>, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
            http_status,
        }
    }

    pub fn no_machine() -> Self {
        Self::new(RemoteErrorKind::NoMachineConnected, "NO_MACHINE", "No machine connected", 400)
            .with_details("Please connect to a machine first")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, "VALIDATION_ERROR", message, 400)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, "NETWORK_ERROR", message, 0)
            .with_details("Unable to connect to the server")
    }

    /// Carries a standardized error body through verbatim
    pub fn remote_execution(body: ApiErrorBody, http_status: u16) -> Self {
        Self {
            kind: RemoteErrorKind::RemoteExecution,
            code: body.code,
            message: body.message,
            details: body.details,
            http_status,
        }
    }

    pub fn unexpected(code: impl Into<String>, message: impl Into<String>, http_status: u16) -> Self {
        Self::new(RemoteErrorKind::Unexpected, code, message, http_status)
    }

    pub fn with_details(mut self, details: impl Into<serde_json::Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn is(&self, kind: RemoteErrorKind) -> bool {
        self.kind == kind
    }
}

/// Failure of the transport itself: nothing usable came back
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("no machine connected")]
    NotConnected,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}
