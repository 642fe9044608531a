//! HTTP transport seam
//!
//! A transport performs exactly one call and reports what came back. It
//! never decides whether the response means success; that belongs to
//! [`crate::classify`].

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::TransportError;

/// HTTP method used by the machine API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request relative to the connected machine's base URL
///
/// Segments are stored raw and percent-encoded when the path is rendered,
/// so service and branch names may contain spaces or slashes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Get, segments)
    }

    pub fn post<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Post, segments)
    }

    pub fn delete<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Delete, segments)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Encoded path and query, without a leading slash
    pub fn path(&self) -> String {
        let mut path = self
            .segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            path.push('?');
            path.push_str(&query);
        }

        path
    }
}

/// A fully addressed call handed to a [`Transport`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingCall {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// What the machine sent back, uninterpreted
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    /// Parsed body when the content type is JSON and it parsed
    pub json: Option<Value>,
    pub text: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn from_json(status: u16, body: Value) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            content_type: Some("application/json".to_string()),
            text: body.to_string(),
            json: Some(body),
        }
    }

    pub fn from_text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            content_type: Some("text/plain".to_string()),
            json: None,
            text: text.into(),
        }
    }
}

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Performs one HTTP call
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, call: OutgoingCall) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport; `None` keeps reqwest's default (no timeout)
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, call: OutgoingCall) -> Result<RawResponse, TransportError> {
        let started = Instant::now();

        let mut request = match call.method {
            Method::Get => self.client.get(&call.url),
            Method::Post => self.client.post(&call.url),
            Method::Delete => self.client.delete(&call.url),
        };
        if let Some(token) = &call.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        let json = match &content_type {
            Some(ct) if ct.contains("application/json") => serde_json::from_str(&text).ok(),
            _ => None,
        };

        debug!(
            "{} {} {} {}ms",
            call.method,
            call.url,
            status.as_u16(),
            started.elapsed().as_millis()
        );

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            json,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_encodes_segments() {
        let req = RemoteRequest::post(["services", "git", "checkout", "My App", "feature/login"]);
        assert_eq!(req.path(), "services/git/checkout/My%20App/feature%2Flogin");
    }

    #[test]
    fn test_path_with_query() {
        let req = RemoteRequest::get(["pm2", "logs", "web"]).with_query("type", "err");
        assert_eq!(req.path(), "pm2/logs/web?type=err");
    }

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::from_text(204, "").is_success());
        assert!(!RawResponse::from_text(302, "").is_success());
        assert!(!RawResponse::from_text(500, "").is_success());
        assert_eq!(RawResponse::from_text(404, "").status_text, "Not Found");
    }
}
