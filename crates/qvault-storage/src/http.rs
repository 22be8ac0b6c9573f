//! The HTTP wire surface for the storage guard (§6): PUT/GET/HEAD/DELETE
//! on content-addressed blob paths, plus a LIST endpoint for enumerating a
//! subtree. Status codes: 200/201 success, 400 malformed path, 403 policy
//! or append-only violation, 404 not found, 409 hash mismatch, 507 quota
//! exceeded.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use qvault_core::types::now;

use crate::error::StorageError;
use crate::guard::{DeleteAuthorization, StorageGuard};

const ACTOR_HEADER: &str = "x-key-id";

#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<StorageGuard>,
}

pub fn router(guard: Arc<StorageGuard>) -> Router {
    Router::new()
        .route("/blob/{*path}", put(put_blob).get(get_blob).head(head_blob).delete(delete_blob))
        .route("/list/{*prefix}", get(list_prefix))
        .route("/list", get(list_root))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { guard })
}

fn actor_key_id(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn put_blob(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, StorageError> {
    let actor = actor_key_id(&headers);
    let outcome = state.guard.put(&path, &body, &actor, now())?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok(status.into_response())
}

async fn get_blob(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, StorageError> {
    let bytes = state.guard.get(&path)?;
    Ok((StatusCode::OK, bytes).into_response())
}

async fn head_blob(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, StorageError> {
    let size = state.guard.head(&path)?;
    let mut resp = StatusCode::OK.into_response();
    resp.headers_mut().insert(
        axum::http::header::CONTENT_LENGTH,
        axum::http::HeaderValue::from_str(&size.to_string()).expect("numeric header value"),
    );
    Ok(resp)
}

#[derive(Deserialize)]
struct DeleteParams {
    ticket_id: Option<String>,
    request_id: Option<String>,
}

async fn delete_blob(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
    Query(params): Query<DeleteParams>,
    headers: HeaderMap,
) -> Result<Response, StorageError> {
    let actor = actor_key_id(&headers);
    let auth = match (params.ticket_id, params.request_id) {
        (Some(ticket_id), Some(request_id)) => DeleteAuthorization::TicketAndRequest { ticket_id, request_id },
        (Some(ticket_id), None) => DeleteAuthorization::Ticket { ticket_id },
        (None, _) => DeleteAuthorization::None,
    };
    state.guard.delete(&path, auth, &actor, now())?;
    Ok(StatusCode::OK.into_response())
}

#[derive(Serialize)]
struct ListResponse {
    entries: Vec<String>,
}

async fn list_prefix(
    State(state): State<AppState>,
    AxumPath(prefix): AxumPath<String>,
) -> Result<Json<ListResponse>, StorageError> {
    let entries = state.guard.list(&prefix)?;
    Ok(Json(ListResponse { entries }))
}

async fn list_root(State(state): State<AppState>) -> Result<Json<ListResponse>, StorageError> {
    let entries = state.guard.list("")?;
    Ok(Json(ListResponse { entries }))
}
