//! Sub-request profiler endpoints.
//!
//! Only answer when the profiler is enabled (`SUBREQUEST_PROFILER=true`);
//! otherwise they are indistinguishable from a missing route.

use axum::{Json, extract::State, http::StatusCode};

use crate::cache::SubRequestEvent;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Buffered sub-request events, oldest first.
pub async fn subrequests(State(state): State<AppState>) -> Result<Json<Vec<SubRequestEvent>>> {
    let log = state.with_cache().event_log();
    if !log.is_enabled() {
        return Err(AppError::NotFound("/debug/subrequests".to_string()));
    }
    Ok(Json(log.snapshot()))
}

/// Drop the buffered events.
pub async fn clear_subrequests(State(state): State<AppState>) -> Result<StatusCode> {
    let log = state.with_cache().event_log();
    if !log.is_enabled() {
        return Err(AppError::NotFound("/debug/subrequests".to_string()));
    }
    log.clear();
    Ok(StatusCode::NO_CONTENT)
}
