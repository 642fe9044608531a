//! Wire types of the connected machine API
//!
//! Field names follow the machine API's camelCase JSON. Everything here is
//! plain data; interpretation of statuses lives in `tsm-control`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of `GET services`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusRow {
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub loaded: String,
    #[serde(default)]
    pub active: String,
    pub status: String,
    #[serde(default)]
    pub on_start_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_loaded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_on_start_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_trigger: Option<String>,
}

impl ServiceStatusRow {
    /// A companion timer exists when the machine reports a timer status
    pub fn has_timer(&self) -> bool {
        self.timer_status
            .as_deref()
            .map_or(false, |s| !s.trim().is_empty())
    }
}

/// Body of `GET services`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesResponse {
    pub services_status_array: Vec<ServiceStatusRow>,
}

/// Body of `GET services/git/{name}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitBranchesResponse {
    #[serde(default)]
    pub git_branches_local_array: Vec<String>,
    #[serde(default)]
    pub git_branches_remote_array: Vec<String>,
    #[serde(default)]
    pub current_branch: String,
}

/// Body returned by git fetch/pull/checkout/delete-branch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Outcome reported by an npm run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpmRunStatus {
    Success,
    Fail,
}

impl std::fmt::Display for NpmRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NpmRunStatus::Success => write!(f, "success"),
            NpmRunStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Body of `POST services/npm/{name}/{install|build}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmRunResponse {
    pub status: NpmRunStatus,
    #[serde(default)]
    pub warnings: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// One PM2-managed app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pm2App {
    pub name: String,
    pub status: String,
    /// Fields the panel does not interpret (pid, cpu, memory, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Body of `GET pm2/apps`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pm2AppsResponse {
    pub managed_apps_array: Vec<Pm2App>,
}

/// Body of `GET pm2/logs/{name}?type=out|err`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pm2LogsResponse {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default, rename = "type")]
    pub stream: Option<String>,
    #[serde(default)]
    pub lines: Option<Vec<String>>,
}

/// Standardized failure body: `{"error": {code, message, status, details?}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_row_with_timer() {
        let json = serde_json::json!({
            "name": "Backup",
            "filename": "backup.service",
            "loaded": "loaded",
            "active": "inactive",
            "status": "inactive",
            "onStartStatus": "disabled",
            "timerStatus": "active",
            "timerOnStartStatus": "enabled",
            "timerTrigger": "Thu 2025-12-25 23:00:00 UTC; 3h 36min left"
        });

        let row: ServiceStatusRow = serde_json::from_value(json).unwrap();
        assert!(row.has_timer());
        assert_eq!(row.on_start_status, "disabled");
        assert_eq!(row.timer_on_start_status.as_deref(), Some("enabled"));
    }

    #[test]
    fn test_service_row_without_timer() {
        let json = serde_json::json!({
            "name": "Api",
            "filename": "api.service",
            "status": "active (running)",
            "timerStatus": ""
        });

        let row: ServiceStatusRow = serde_json::from_value(json).unwrap();
        assert!(!row.has_timer());
        assert!(row.loaded.is_empty());
    }

    #[test]
    fn test_services_response_requires_array() {
        let missing = serde_json::json!({ "services": [] });
        assert!(serde_json::from_value::<ServicesResponse>(missing).is_err());
    }

    #[test]
    fn test_pm2_app_keeps_extra_fields() {
        let json = serde_json::json!({ "name": "web", "status": "online", "pm_id": 3 });
        let app: Pm2App = serde_json::from_value(json).unwrap();
        assert_eq!(app.status, "online");
        assert_eq!(app.extra.get("pm_id"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_error_envelope_details_optional() {
        let json = serde_json::json!({
            "error": { "code": "GIT_FAILED", "message": "fetch failed", "status": 500 }
        });
        let envelope: ApiErrorEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(envelope.error.code, "GIT_FAILED");
        assert!(envelope.error.details.is_none());
    }
}
