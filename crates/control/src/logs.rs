//! Log views and cancellable log following
//!
//! A [`LogFollower`] polls one log source on a fixed interval until its
//! cancellation token fires or the frame receiver is dropped. There is no
//! backoff: a failed fetch is delivered as a frame and the next tick
//! fetches again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tsm_common::Pm2LogsResponse;

use crate::classify::{check, expect_shape};
use crate::client::RemoteActionClient;
use crate::error::RemoteError;
use crate::transport::RemoteRequest;

/// Shown when a PM2 log stream has no lines
pub const NO_LOGS: &str = "No logs available";

const MIN_INTERVAL: Duration = Duration::from_millis(100);
const FRAME_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pm2Stream {
    Out,
    Err,
}

impl Pm2Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pm2Stream::Out => "out",
            Pm2Stream::Err => "err",
        }
    }
}

impl std::fmt::Display for Pm2Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where log text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// journal of a systemd service
    Service(String),
    App { name: String, stream: Pm2Stream },
    Syslog,
}

impl LogSource {
    pub fn request(&self) -> RemoteRequest {
        match self {
            LogSource::Service(name) => RemoteRequest::get(["services", "logs", name.as_str()]),
            LogSource::App { name, stream } => {
                RemoteRequest::get(["pm2", "logs", name.as_str()]).with_query("type", stream.as_str())
            }
            LogSource::Syslog => RemoteRequest::get(["machines", "syslog"]),
        }
    }
}

impl std::fmt::Display for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSource::Service(name) => write!(f, "service {}", name),
            LogSource::App { name, stream } => write!(f, "app {} ({})", name, stream),
            LogSource::Syslog => write!(f, "syslog"),
        }
    }
}

/// Fetch the current log text once
pub async fn fetch_logs(client: &RemoteActionClient, source: &LogSource) -> Result<String, RemoteError> {
    let operation = format!("fetch logs for {}", source);
    let response = check(client.send(&source.request()).await, &operation)?;

    match source {
        LogSource::App { .. } => {
            let body: Pm2LogsResponse = expect_shape(&response, "lines")?;
            match body.lines {
                Some(lines) if !lines.is_empty() => Ok(lines.join("\n")),
                _ => Ok(NO_LOGS.to_string()),
            }
        }
        LogSource::Service(_) | LogSource::Syslog => Ok(response.text),
    }
}

/// One poll result
#[derive(Debug, Clone)]
pub struct LogFrame {
    pub fetched_at: DateTime<Utc>,
    pub result: Result<String, RemoteError>,
}

/// Handle to a background polling task
///
/// Dropping the handle cancels the task.
pub struct LogFollower {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LogFollower {
    /// Start polling; the first fetch happens immediately
    pub fn spawn(
        client: RemoteActionClient,
        source: LogSource,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<LogFrame>) {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let period = interval.max(MIN_INTERVAL);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            follow(client, source, period, token, tx).await;
        });

        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the polling task to stop
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!("Log follower task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LogFollower {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow(
    client: RemoteActionClient,
    source: LogSource,
    period: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<LogFrame>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!("Following logs of {} every {:?}", source, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fetch_logs(&client, &source) => result,
        };
        if let Err(e) = &result {
            debug!("Log fetch for {} failed: {}", source, e);
        }

        let frame = LogFrame {
            fetched_at: Utc::now(),
            result,
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(frame) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Stopped following logs of {}", source);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MachineContext;
    use crate::error::{RemoteErrorKind, TransportError};
    use crate::testing::{connected_client, ScriptedTransport};
    use crate::transport::{Method, RawResponse};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_service_logs_is_plain_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "services/logs/My%20App", RawResponse::from_text(200, "line 1\nline 2"));
        let client = connected_client(transport.clone());

        let text = fetch_logs(&client, &LogSource::Service("My App".to_string())).await.unwrap();
        assert_eq!(text, "line 1\nline 2");
    }

    #[tokio::test]
    async fn test_fetch_app_logs_joins_lines() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Get,
            "pm2/logs/web?type=err",
            RawResponse::from_json(200, json!({"appName": "web", "type": "err", "lines": ["a", "b"]})),
        );
        transport.respond(
            Method::Get,
            "pm2/logs/web?type=out",
            RawResponse::from_json(200, json!({"appName": "web", "type": "out", "lines": []})),
        );
        let client = connected_client(transport.clone());

        let err = LogSource::App {
            name: "web".to_string(),
            stream: Pm2Stream::Err,
        };
        let out = LogSource::App {
            name: "web".to_string(),
            stream: Pm2Stream::Out,
        };
        assert_eq!(fetch_logs(&client, &err).await.unwrap(), "a\nb");
        assert_eq!(fetch_logs(&client, &out).await.unwrap(), NO_LOGS);
    }

    #[tokio::test]
    async fn test_fetch_syslog_error_is_classified() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Get,
            "machines/syslog",
            RawResponse::from_json(
                403,
                json!({"error": {"code": "FORBIDDEN", "message": "Cannot read syslog", "status": 403}}),
            ),
        );
        let client = connected_client(transport.clone());

        let err = fetch_logs(&client, &LogSource::Syslog).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::RemoteExecution);
        assert_eq!(err.code, "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_fetch_without_machine() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = RemoteActionClient::new(MachineContext::disconnected(), transport.clone());

        let err = fetch_logs(&client, &LogSource::Syslog).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NoMachineConnected);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_follower_delivers_frames_until_cancelled() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "machines/syslog", RawResponse::from_text(200, "boot ok"));
        let client = connected_client(transport.clone());

        let (follower, mut rx) = LogFollower::spawn(
            client,
            LogSource::Syslog,
            Duration::from_millis(100),
            CancellationToken::new(),
        );

        for _ in 0..2 {
            let frame = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(frame.result.unwrap(), "boot ok");
        }

        follower.cancel();
        let drained = timeout(WAIT, async { while rx.recv().await.is_some() {} }).await;
        assert!(drained.is_ok());
        timeout(WAIT, follower.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_follower_keeps_polling_after_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail(
            Method::Get,
            "machines/syslog",
            TransportError::Connect("connection refused".to_string()),
        );
        let client = connected_client(transport.clone());
        let cancel = CancellationToken::new();

        let (_follower, mut rx) = LogFollower::spawn(client, LogSource::Syslog, Duration::from_millis(100), cancel.clone());

        for _ in 0..2 {
            let frame = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(frame.result.unwrap_err().kind, RemoteErrorKind::Network);
        }
        cancel.cancel();
        assert!(transport.calls_to(Method::Get, "machines/syslog") >= 2);
    }

    #[tokio::test]
    async fn test_follower_stops_when_receiver_dropped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "machines/syslog", RawResponse::from_text(200, "x"));
        let client = connected_client(transport.clone());
        let cancel = CancellationToken::new();

        let (follower, rx) = LogFollower::spawn(client, LogSource::Syslog, Duration::from_millis(100), cancel.clone());
        drop(rx);

        timeout(WAIT, follower.join()).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, "machines/syslog"), 1);
    }
}
