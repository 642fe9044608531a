//! Scripted transport for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::client::RemoteActionClient;
use crate::context::{ConnectedMachine, MachineContext};
use crate::error::TransportError;
use crate::resolver::ActionResolver;
use crate::session::ControlSession;
use crate::transport::{Method, OutgoingCall, RawResponse, Transport};

pub(crate) const BASE_URL: &str = "http://machine.test";

#[derive(Clone)]
enum Scripted {
    Respond(RawResponse),
    Fail(TransportError),
    Hold {
        arrived: Arc<Notify>,
        release: Arc<Notify>,
        response: RawResponse,
    },
}

/// Answers calls from a per-route queue and records every call
///
/// The last queued answer for a route is sticky.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<OutgoingCall>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, answer: Scripted) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(answer);
    }

    pub(crate) fn respond(&self, method: Method, path: &str, response: RawResponse) {
        self.push(method, path, Scripted::Respond(response));
    }

    pub(crate) fn fail(&self, method: Method, path: &str, error: TransportError) {
        self.push(method, path, Scripted::Fail(error));
    }

    /// Answer only once `release` is notified; `arrived` fires when the call lands
    pub(crate) fn hold(&self, method: Method, path: &str, response: RawResponse) -> (Arc<Notify>, Arc<Notify>) {
        let arrived = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.push(
            method,
            path,
            Scripted::Hold {
                arrived: arrived.clone(),
                release: release.clone(),
                response,
            },
        );
        (arrived, release)
    }

    pub(crate) fn calls(&self) -> Vec<OutgoingCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_to(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && path_of(&c.url) == path)
            .count()
    }
}

fn path_of(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap_or(url).trim_start_matches('/')
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, call: OutgoingCall) -> Result<RawResponse, TransportError> {
        let key = (call.method, path_of(&call.url).to_string());
        self.calls.lock().push(call);

        let next = {
            let mut routes = self.routes.lock();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hold {
                arrived,
                release,
                response,
            }) => {
                arrived.notify_one();
                release.notified().await;
                Ok(response)
            }
            None => Ok(RawResponse::from_text(404, "no route")),
        }
    }
}

pub(crate) fn connected_client(transport: Arc<ScriptedTransport>) -> RemoteActionClient {
    let ctx = MachineContext::connected(ConnectedMachine::new("test-box", BASE_URL), Some("t0ken".to_string()));
    RemoteActionClient::new(ctx, transport)
}

pub(crate) fn connected_session(transport: Arc<ScriptedTransport>) -> ControlSession {
    ControlSession::new(connected_client(transport), ActionResolver::default())
}
