//! TSM Remote Resource Control
//!
//! Derives actionable state from snapshots fetched off a connected machine,
//! resolves toggles into concrete remote actions, guards against duplicate
//! dispatch and reconciles with the machine after every mutation.
//!
//! Data flows one way per operation:
//!
//! ```text
//! toggle -> ActionResolver -> InFlightActionTracker -> RemoteActionClient
//!        -> (ok: re-fetch snapshot | err: classify) -> caller
//! ```

pub mod classify;
pub mod client;
pub mod context;
pub mod error;
pub mod inflight;
pub mod logs;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::RemoteActionClient;
pub use context::{ConnectedMachine, MachineContext};
pub use error::{RemoteError, RemoteErrorKind, TransportError};
pub use inflight::{ActionKey, InFlightActionTracker, InFlightGuard, PendingAction};
pub use logs::{fetch_logs, LogFollower, LogFrame, LogSource, Pm2Stream};
pub use resolver::{
    ActionPlan, ActionResolver, ActionToken, GitSync, NpmAction, DEFAULT_SELF_MANAGED_SERVICE,
};
pub use session::{ControlSession, Dispatch, GitOutcome, NpmReport};
pub use snapshot::{ResourceId, ResourceKind, ResourceSnapshot, SnapshotDetail};
pub use state::{Axis, AxisReading, AxisState, BootState, RunState};
pub use transport::{HttpTransport, Method, OutgoingCall, RawResponse, RemoteRequest, Transport};
