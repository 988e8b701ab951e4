use std::collections::HashMap;

use {
    axum::{
        Json,
        extract::{Path, Request, State},
        http::StatusCode,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    tracing::debug,
};

use crate::server::AppState;

pub const SESSION_NOT_FOUND: &str = "Session not found";

/// Reject requests for a `{session_id}` that has no live session.
pub async fn require_session(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let known = params
        .get("session_id")
        .is_some_and(|id| state.gateway.messages.sessions().contains(id));
    if !known {
        debug!(session_id = ?params.get("session_id"), "request for unknown session");
        return session_not_found();
    }
    next.run(request).await
}

pub fn session_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": SESSION_NOT_FOUND })),
    )
        .into_response()
}
