//! Remote action client
//!
//! Addresses requests against the connected machine and attaches the
//! bearer token. Responses are returned raw.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::context::MachineContext;
use crate::error::TransportError;
use crate::transport::{HttpTransport, OutgoingCall, RawResponse, RemoteRequest, Transport};

/// Client for one connected machine's API
#[derive(Clone)]
pub struct RemoteActionClient {
    context: MachineContext,
    transport: Arc<dyn Transport>,
}

impl RemoteActionClient {
    pub fn new(context: MachineContext, transport: Arc<dyn Transport>) -> Self {
        Self { context, transport }
    }

    /// Client backed by [`HttpTransport`]
    pub fn http(context: MachineContext, timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self::new(context, Arc::new(HttpTransport::new(timeout)?)))
    }

    pub fn context(&self) -> &MachineContext {
        &self.context
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_connected()
    }

    /// Full URL a request would be sent to
    pub fn url_for(&self, request: &RemoteRequest) -> Option<String> {
        self.context
            .base_url()
            .map(|base| format!("{}/{}", base, request.path()))
    }

    /// Perform one call without interpreting the outcome
    pub async fn send(&self, request: &RemoteRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request).ok_or(TransportError::NotConnected)?;

        debug!("Dispatching {} {}", request.method, url);

        let call = OutgoingCall {
            method: request.method,
            url,
            bearer: self.context.token().map(str::to_string),
            body: request.body.clone(),
        };
        self.transport.execute(call).await
    }
}
