use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use storechat_db::models::{Room, RoomStatus};
use storechat_services::dao::base::PaginationParams;

use crate::{chat, error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub assigned_staff_id: Option<String>,
    pub status: RoomStatus,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_for_customer: i64,
    pub unread_for_staff: i64,
    pub closed_at: Option<String>,
    pub created_at: String,
}

/// Customer entry point: resolves the caller's single support room,
/// creating it on first contact. Concurrent calls (two tabs) observe the
/// same room id.
pub async fn open(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<RoomResponse>, ApiError> {
    if auth.principal.is_staff() {
        return Err(ApiError::Forbidden(
            "Only customers have a personal support room".to_string(),
        ));
    }

    let room = state
        .rooms
        .get_or_create(auth.principal.id, &auth.principal.display_name)
        .await?;

    Ok(Json(to_response(room)))
}

#[derive(Debug, Deserialize)]
pub struct RoomListParams {
    pub status: Option<RoomStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Staff console room list: optional status/search filters, most recent
/// activity first.
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<RoomListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_staff()?;

    let pagination = PaginationParams { page: params.page, per_page: params.per_page };
    let result = state
        .rooms
        .list(params.status, params.search.as_deref(), &pagination)
        .await?;

    let items: Vec<RoomResponse> = result.items.into_iter().map(to_response).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, ApiError> {
    let (_, room) = chat::load_room(&state, &auth.principal, &room_id).await?;
    Ok(Json(to_response(room)))
}

pub async fn close(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_staff()?;
    let (rid, _) = chat::load_room(&state, &auth.principal, &room_id).await?;

    let _guard = state.room_locks.acquire(rid).await;
    state.rooms.close(rid).await?;

    Ok(Json(serde_json::json!({ "closed": true })))
}

/// Reopening resets both unread counters and clears `closed_at`; history
/// is retained throughout.
pub async fn reopen(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_staff()?;
    let (rid, _) = chat::load_room(&state, &auth.principal, &room_id).await?;

    let _guard = state.room_locks.acquire(rid).await;
    state.rooms.reopen(rid).await?;

    Ok(Json(serde_json::json!({ "reopened": true })))
}

fn to_response(room: Room) -> RoomResponse {
    RoomResponse {
        id: room.id.map(|id| id.to_hex()).unwrap_or_default(),
        customer_id: room.customer_id.to_hex(),
        customer_name: room.customer_name,
        assigned_staff_id: room.assigned_staff_id.map(|id| id.to_hex()),
        status: room.status,
        last_message_preview: room.last_message_preview,
        last_message_at: room
            .last_message_at
            .and_then(|t| t.try_to_rfc3339_string().ok()),
        unread_for_customer: room.unread_for_customer,
        unread_for_staff: room.unread_for_staff,
        closed_at: room.closed_at.and_then(|t| t.try_to_rfc3339_string().ok()),
        created_at: room.created_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}
