//! Log Commands
//!
//! One-shot log reads, or `--follow` to keep polling until Ctrl-C.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::io::Write;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tsm_control::{fetch_logs, LogFollower, LogFrame, LogSource, Pm2Stream};

use crate::connect::Connection;
use crate::output::OutputFormat;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Journal of a systemd service
    Service {
        /// Service name
        name: String,

        /// Keep polling for new lines
        #[arg(short, long)]
        follow: bool,
    },

    /// Output of a PM2 app
    App {
        /// App name
        name: String,

        /// Which stream to read
        #[arg(short, long, value_enum, default_value = "out")]
        stream: StreamArg,

        /// Keep polling for new lines
        #[arg(short, long)]
        follow: bool,
    },

    /// Machine syslog
    Syslog {
        /// Keep polling for new lines
        #[arg(short, long)]
        follow: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamArg {
    Out,
    Err,
}

impl From<StreamArg> for Pm2Stream {
    fn from(stream: StreamArg) -> Self {
        match stream {
            StreamArg::Out => Pm2Stream::Out,
            StreamArg::Err => Pm2Stream::Err,
        }
    }
}

pub async fn execute(cmd: LogsCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    let (source, follow) = match cmd {
        LogsCommands::Service { name, follow } => (LogSource::Service(name), follow),
        LogsCommands::App { name, stream, follow } => (
            LogSource::App {
                name,
                stream: stream.into(),
            },
            follow,
        ),
        LogsCommands::Syslog { follow } => (LogSource::Syslog, follow),
    };

    if follow {
        follow_logs(conn, source).await
    } else {
        let text = fetch_logs(&conn.client()?, &source).await?;
        match format {
            OutputFormat::Json => {
                let body = json!({ "source": source.to_string(), "logs": text });
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            _ => println!("{}", text),
        }
        Ok(())
    }
}

async fn follow_logs(conn: &Connection, source: LogSource) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, stopping log follower");
            on_interrupt.cancel();
        }
    });

    let interval = conn.config.log_poll_interval();
    let (follower, mut frames) = LogFollower::spawn(conn.client()?, source.clone(), interval, cancel);

    eprintln!("{}", format!("Following {} (Ctrl-C to stop)", source).dimmed());

    render_frames(&mut frames, &mut std::io::stdout(), &mut std::io::stderr()).await?;

    follower.join().await;
    Ok(())
}

/// New log lines go to `out`; fetch failures go to `err`, once per distinct message
async fn render_frames<O: Write, E: Write>(
    frames: &mut mpsc::Receiver<LogFrame>,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<()> {
    let mut shown: Vec<String> = Vec::new();
    let mut last_error: Option<String> = None;

    while let Some(frame) = frames.recv().await {
        match frame.result {
            Ok(text) => {
                last_error = None;
                for line in new_lines(&shown, &text) {
                    writeln!(out, "{}", line)?;
                }
                out.flush()?;
                shown = text.lines().map(str::to_string).collect();
            }
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() != Some(message.as_str()) {
                    writeln!(err, "⚠️  {} at {}", message, frame.fetched_at.format("%H:%M:%S"))?;
                }
                last_error = Some(message);
            }
        }
    }

    Ok(())
}

/// Lines of `current` not already shown
///
/// Log endpoints return a trailing window, so the overlap is the longest
/// tail of `shown` that starts `current`.
pub fn new_lines<'a>(shown: &[String], current: &'a str) -> Vec<&'a str> {
    let lines: Vec<&str> = current.lines().collect();
    let max = shown.len().min(lines.len());

    let overlap = (1..=max)
        .rev()
        .find(|&k| {
            shown[shown.len() - k..]
                .iter()
                .zip(&lines[..k])
                .all(|(a, b)| a == b)
        })
        .unwrap_or(0);

    lines[overlap..].to_vec()
}
