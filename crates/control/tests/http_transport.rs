//! End-to-end checks of the reqwest transport against a fake machine API

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tsm_control::classify::HTTP_ERROR;
use tsm_control::{
    fetch_logs, ActionResolver, Axis, AxisState, ConnectedMachine, ControlSession, Dispatch, LogSource,
    MachineContext, Pm2Stream, RemoteActionClient, RemoteErrorKind, ResourceId, RunState,
};

const TOKEN: &str = "secret";

#[derive(Default)]
struct Machine {
    running: Mutex<bool>,
    actions: Mutex<Vec<String>>,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": "UNAUTHORIZED", "message": "Invalid token", "status": 401}})),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", TOKEN))
}

async fn services(State(machine): State<Arc<Machine>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let status = if *machine.running.lock() { "active (running)" } else { "inactive (dead)" };
    Json(json!({
        "servicesStatusArray": [{
            "name": "my unit",
            "filename": "my unit.service",
            "loaded": "loaded",
            "active": "",
            "status": status,
            "onStartStatus": "enabled",
        }]
    }))
    .into_response()
}

async fn service_action(
    State(machine): State<Arc<Machine>>,
    headers: HeaderMap,
    Path((filename, action)): Path<(String, String)>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if filename == "broken.service" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"code": "SYSTEMCTL_FAILED", "message": "Job failed", "status": 500, "details": ["exit 1"]}})),
        )
            .into_response();
    }

    machine.actions.lock().push(format!("{} {}", filename, action));
    if action == "start" {
        *machine.running.lock() = true;
    }
    Json(json!({"message": "ok"})).into_response()
}

async fn pm2_logs(Path(name): Path<String>, Query(query): Query<HashMap<String, String>>) -> Response {
    let stream = query.get("type").cloned().unwrap_or_default();
    Json(json!({"appName": name, "type": stream, "lines": [format!("{} {}", name, stream)]})).into_response()
}

async fn syslog() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "journald is down").into_response()
}

async fn start_machine() -> (SocketAddr, Arc<Machine>) {
    let machine = Arc::new(Machine::default());
    let app = Router::new()
        .route("/services", get(services))
        .route("/services/:filename/:action", post(service_action))
        .route("/pm2/logs/:name", get(pm2_logs))
        .route("/machines/syslog", get(syslog))
        .with_state(machine.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, machine)
}

fn client(addr: SocketAddr, token: &str) -> RemoteActionClient {
    let ctx = MachineContext::connected(
        ConnectedMachine::new("local", format!("http://{}/", addr)),
        Some(token.to_string()),
    );
    RemoteActionClient::http(ctx, None).unwrap()
}

#[tokio::test]
async fn test_toggle_round_trip_over_http() {
    let (addr, machine) = start_machine().await;
    let session = ControlSession::new(client(addr, TOKEN), ActionResolver::default());

    session.refresh_services().await.unwrap();
    let id = ResourceId::service("my unit.service");

    let dispatch = session.toggle(&id, Axis::Run).await.unwrap();
    let snapshot = match dispatch {
        Dispatch::Completed { outcome, .. } => outcome.unwrap(),
        other => panic!("unexpected {:?}", other),
    };

    assert_eq!(snapshot.axis(Axis::Run).unwrap().state, AxisState::Run(RunState::Active));
    assert_eq!(*machine.actions.lock(), vec!["my unit.service start".to_string()]);
    assert!(!session.is_pending(&id, Axis::Run));
}

#[tokio::test]
async fn test_bad_token_is_remote_execution() {
    let (addr, _) = start_machine().await;
    let session = ControlSession::new(client(addr, "wrong"), ActionResolver::default());

    let err = session.refresh_services().await.unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::RemoteExecution);
    assert_eq!(err.code, "UNAUTHORIZED");
    assert_eq!(err.http_status, 401);
}

#[tokio::test]
async fn test_standard_error_wins_over_status() {
    let (addr, _) = start_machine().await;
    let client = client(addr, TOKEN);

    let request = tsm_control::RemoteRequest::post(["services", "broken.service", "stop"]);
    let err = tsm_control::classify::check(client.send(&request).await, "stop broken.service").unwrap_err();

    assert_eq!(err.kind, RemoteErrorKind::RemoteExecution);
    assert_eq!(err.code, "SYSTEMCTL_FAILED");
    assert_eq!(err.details, Some(json!(["exit 1"])));
}

#[tokio::test]
async fn test_plain_text_failure_is_unexpected() {
    let (addr, _) = start_machine().await;

    let err = fetch_logs(&client(addr, TOKEN), &LogSource::Syslog).await.unwrap_err();

    assert_eq!(err.kind, RemoteErrorKind::Unexpected);
    assert_eq!(err.code, HTTP_ERROR);
    assert_eq!(err.http_status, 503);
    assert!(err.message.contains("503 Service Unavailable"));
}

#[tokio::test]
async fn test_pm2_logs_query_and_json_body() {
    let (addr, _) = start_machine().await;
    let source = LogSource::App {
        name: "web app".to_string(),
        stream: Pm2Stream::Err,
    };

    let text = fetch_logs(&client(addr, TOKEN), &source).await.unwrap();
    assert_eq!(text, "web app err");
}

#[tokio::test]
async fn test_unreachable_machine_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = ControlSession::new(client(addr, TOKEN), ActionResolver::default());
    let err = session.refresh_services().await.unwrap_err();

    assert_eq!(err.kind, RemoteErrorKind::Network);
    assert_eq!(err.http_status, 0);
}
