//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Individual readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub cache: CacheCheck,
    pub scratch: CheckResult,
}

/// Synthesis cache occupancy
#[derive(Serialize)]
pub struct CacheCheck {
    pub status: &'static str,
    pub entries: usize,
    pub capacity: usize,
}

/// Result of a single health check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: Some(message.into()),
        }
    }
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - can uploads be accepted?
///
/// Never contacts the remote services.
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let cache = state.pipeline.cache();
    let cache_check = CacheCheck {
        status: "ok",
        entries: cache.len(),
        capacity: cache.capacity(),
    };

    let scratch_dir = state.pipeline.scratch().root().to_path_buf();
    let scratch_check = tokio::task::spawn_blocking(move || check_scratch(&scratch_dir))
        .await
        .unwrap_or_else(|e| CheckResult::fail(format!("check panicked: {e}")));

    let all_ok = scratch_check.status == "ok";
    let (status, http_status) = if all_ok {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks {
                cache: cache_check,
                scratch: scratch_check,
            },
        }),
    )
}

/// Check the scratch directory exists (creating it if needed) and is writable
fn check_scratch(dir: &std::path::Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::fail(format!("cannot create {}: {e}", dir.display()));
    }
    match std::fs::metadata(dir) {
        Ok(meta) if meta.permissions().readonly() => {
            CheckResult::fail(format!("{} is read-only", dir.display()))
        }
        Ok(_) => CheckResult::ok(),
        Err(e) => CheckResult::fail(format!("cannot stat {}: {e}", dir.display())),
    }
}

/// Build health router (liveness only, no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build readiness router
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
