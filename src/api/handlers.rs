//! Polling API handlers.
//!
//! # Endpoints
//! - `GET /messages?serverId=&last=` - Discord messages after a cursor
//! - `POST /send` - relay a game message to Discord
//! - `POST /register-server` - create (or confirm) a server's relay channel
//! - `POST /unregister-server` - delete a server's relay channel and buffer
//! - `GET /health` - bridge status

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiResult;
use super::AppState;
use crate::common::RelayError;
use crate::relay::{RelayedMessage, SendRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub server_id: Option<String>,
    /// ID of the last message the caller has seen.
    pub last: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<RelayedMessage>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRequest {
    pub server_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub channel_id: String,
    pub channel_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub discord: &'static str,
    pub active_servers: usize,
    pub total_messages: usize,
}

/// Resolve the addressed server, falling back to the fixed channel's server.
fn server_id(state: &AppState, requested: Option<String>) -> ApiResult<String> {
    requested
        .filter(|id| !id.trim().is_empty())
        .or_else(|| state.registry.default_tenant().map(str::to_string))
        .ok_or_else(|| RelayError::MissingField("serverId".to_string()).into())
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let server_id = server_id(&state, query.server_id)?;
    let messages = state
        .registry
        .list_messages(&server_id, query.last.as_deref())
        .await;

    Ok(Json(MessagesResponse {
        count: messages.len(),
        messages,
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(request) = body?;
    state.relay.send(request).await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn register_server(
    State(state): State<AppState>,
    body: Result<Json<ServerRequest>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(request) = body?;
    let server_id = server_id(&state, request.server_id)?;
    let channel = state.registry.resolve_or_create(&server_id).await?;

    Ok(Json(RegisterResponse {
        success: true,
        channel_id: channel.id.to_string(),
        channel_name: channel.name,
    }))
}

pub async fn unregister_server(
    State(state): State<AppState>,
    body: Result<Json<ServerRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(request) = body?;
    let server_id = server_id(&state, request.server_id)?;
    state.registry.unregister(&server_id).await;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.stats().await;
    Json(HealthResponse {
        status: "online",
        discord: if state.connection.is_connected() {
            "connected"
        } else {
            "disconnected"
        },
        active_servers: stats.tenants,
        total_messages: stats.buffered_messages,
    })
}
