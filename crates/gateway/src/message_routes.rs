//! `/sessions/{session_id}/messages` routes.
//!
//! | Method | Path              | Operation          |
//! |--------|-------------------|--------------------|
//! | GET    | `/`               | paged history      |
//! | POST   | `/send`           | single send        |
//! | POST   | `/send/bulk`      | bulk send          |
//! | POST   | `/download`       | media download     |
//! | DELETE | `/delete`         | delete for everyone|
//! | DELETE | `/delete/onlyme`  | delete for me      |

use std::collections::HashMap;

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderValue, StatusCode, header},
        middleware,
        response::{IntoResponse, Response},
        routing::{delete, get, post},
    },
    courier_messages::{
        BulkItem, DeleteRequest, Error, JID_NOT_FOUND, SEND_FAILED, SendRequest,
    },
    courier_session::MessageEnvelope,
    serde::de::DeserializeOwned,
    serde_json::{Value, json},
    tracing::error,
};

use crate::{
    server::AppState,
    session_guard::{SESSION_NOT_FOUND, require_session},
    validation::{
        ValidationErrors, decode, parse_body, parse_list_query, validate_bulk, validate_delete,
        validate_envelope, validate_send,
    },
};

pub const LIST_FAILED: &str = "An error occurred during message list";
pub const DOWNLOAD_FAILED: &str = "An error occurred during message media download";
pub const DELETE_FAILED: &str = "An error occurred during message delete";
pub const QUOTE_NOT_FOUND: &str = "Quoted message not found";

pub fn message_router(state: AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/sessions/{session_id}/messages/send", post(send))
        .route("/sessions/{session_id}/messages/send/bulk", post(send_bulk))
        .route("/sessions/{session_id}/messages/download", post(download))
        .route("/sessions/{session_id}/messages/delete", delete(delete_message))
        .route(
            "/sessions/{session_id}/messages/delete/onlyme",
            delete(delete_for_me),
        )
        .route_layer(middleware::from_fn_with_state(state, require_session));

    // History is readable for sessions that are not live.
    Router::new()
        .route("/sessions/{session_id}/messages", get(list))
        .merge(guarded)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Map a pipeline failure to its HTTP response. Client errors keep their
/// specific message; everything else logs and answers with `failure`.
fn error_response(session_id: &str, err: &Error, failure: &'static str) -> Response {
    match err {
        Error::SessionNotFound { .. } => json_error(StatusCode::NOT_FOUND, SESSION_NOT_FOUND),
        Error::InvalidDestination { .. } => json_error(StatusCode::BAD_REQUEST, JID_NOT_FOUND),
        Error::QuoteNotFound { .. } => json_error(StatusCode::BAD_REQUEST, QUOTE_NOT_FOUND),
        _ => {
            error!(session_id, error = %err, "{failure}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, failure)
        },
    }
}

/// Parse, shape-check and decode a JSON body.
fn checked_body<T: DeserializeOwned>(
    raw: &[u8],
    check: fn(&Value) -> Result<(), ValidationErrors>,
) -> Result<T, ValidationErrors> {
    let body = parse_body(raw)?;
    check(&body)?;
    decode(body)
}

async fn list(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = match parse_list_query(&params) {
        Ok(query) => query,
        Err(errors) => return errors.into_response(),
    };
    match state
        .gateway
        .messages
        .list(&session_id, query.cursor, query.limit)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(&session_id, &e, LIST_FAILED),
    }
}

async fn send(State(state): State<AppState>, Path(session_id): Path<String>, body: Bytes) -> Response {
    let request: SendRequest = match checked_body(&body, validate_send) {
        Ok(request) => request,
        Err(errors) => return errors.into_response(),
    };
    match state.gateway.messages.send(&session_id, &request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&session_id, &e, SEND_FAILED),
    }
}

async fn send_bulk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let items: Vec<BulkItem> = match checked_body(&body, validate_bulk) {
        Ok(items) => items,
        Err(errors) => return errors.into_response(),
    };
    match state.gateway.messages.send_bulk(&session_id, &items).await {
        Ok(outcome) => {
            let status = if outcome.is_total_failure() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (status, Json(outcome)).into_response()
        },
        Err(e) => error_response(&session_id, &e, SEND_FAILED),
    }
}

async fn download(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let envelope: MessageEnvelope = match checked_body(&body, validate_envelope) {
        Ok(envelope) => envelope,
        Err(errors) => return errors.into_response(),
    };
    match state.gateway.messages.download(&session_id, &envelope).await {
        Ok(media) => {
            let content_type = HeaderValue::from_str(&media.mime_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                media.bytes,
            )
                .into_response()
        },
        Err(e) => error_response(&session_id, &e, DOWNLOAD_FAILED),
    }
}

async fn delete_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let request: DeleteRequest = match checked_body(&body, validate_delete) {
        Ok(request) => request,
        Err(errors) => return errors.into_response(),
    };
    match state.gateway.messages.delete(&session_id, &request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&session_id, &e, DELETE_FAILED),
    }
}

async fn delete_for_me(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let request: DeleteRequest = match checked_body(&body, validate_delete) {
        Ok(request) => request,
        Err(errors) => return errors.into_response(),
    };
    match state
        .gateway
        .messages
        .delete_for_me(&session_id, &request)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&session_id, &e, DELETE_FAILED),
    }
}
