use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use serde::Deserialize;
use storechat_db::models::MessageKind;
use storechat_services::dao::base::PaginationParams;

use crate::{
    chat,
    error::ApiError,
    extractors::auth::AuthUser,
    state::AppState,
    ws::protocol::MessagePayload,
};

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Room history in durable order, paginated. The payload shape matches the
/// realtime `new_message` push so clients can merge both by id.
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (rid, _) = chat::load_room(&state, &auth.principal, &room_id).await?;

    let pagination = PaginationParams {
        page: params.page,
        per_page: params.per_page.or(Some(state.settings.chat.history_page_size)),
    };
    let result = state.messages.find_in_room(rid, &pagination).await?;

    let items: Vec<MessagePayload> =
        result.items.into_iter().map(MessagePayload::from).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub message: String,
    #[serde(default)]
    pub kind: MessageKind,
}

/// HTTP fallback for sending. Same validation, persistence and fan-out as
/// the WebSocket path; clients without a live channel lose nothing but
/// latency.
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Json<MessagePayload>, ApiError> {
    let (rid, _) = chat::load_room(&state, &auth.principal, &room_id).await?;

    let message =
        chat::post_message(&state, &auth.principal, rid, req.message, req.kind).await?;

    Ok(Json(MessagePayload::from(message)))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_ids: Option<Vec<String>>,
}

/// Batch read receipt over HTTP. Omitting `message_ids` sweeps everything
/// currently unread and addressed to the caller.
pub async fn read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (rid, _) = chat::load_room(&state, &auth.principal, &room_id).await?;

    let within = req.message_ids.map(|ids| {
        ids.iter()
            .filter_map(|s| ObjectId::parse_str(s).ok())
            .collect::<Vec<_>>()
    });
    let (message_ids, read_at) =
        chat::mark_read(&state, &auth.principal, rid, within).await?;

    Ok(Json(serde_json::json!({
        "message_ids": message_ids.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
        "read_at": read_at.try_to_rfc3339_string().unwrap_or_default(),
    })))
}
