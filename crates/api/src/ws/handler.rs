use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use storechat_services::auth::Principal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{self, presence};
use crate::error::ApiError;
use crate::state::AppState;

use super::dispatcher;
use super::protocol::{ClientEvent, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// The bearer credential rides on the upgrade request and is exchanged for
/// a principal before the 101 completes; an unauthenticated channel is
/// refused here and never registers.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let principal = match state.auth.verify_token(&params.token) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    let channel_id = Uuid::new_v4().to_string();
    info!(user_id = %principal.id, role = ?principal.role, %channel_id, "WebSocket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task drains the channel queue; fan-out elsewhere only ever
    // does a non-blocking push into it.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    let registered = state.registry.register(&channel_id, principal.clone(), tx);
    if registered.went_online {
        presence::broadcast_online(&state, &principal, registered.staff_pool_online).await;
    }

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_event(&state, &principal, &channel_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(user_id = %principal.id, %channel_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Abnormal drops and explicit closes land here alike; unregister is
    // idempotent in case a failed push already reaped this channel.
    if let Some(gone) = state.registry.unregister(&channel_id)
        && gone.went_offline
    {
        presence::broadcast_offline(&state, &gone.principal, gone.staff_pool_offline).await;
    }
    writer.abort();

    info!(user_id = %principal.id, %channel_id, "WebSocket disconnected");
}

async fn handle_client_event(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(user_id = %principal.id, %e, "Unparseable WS event");
            send_error(
                state,
                channel_id,
                &ApiError::BadRequest("Unrecognized event".to_string()),
            )
            .await;
            return;
        }
    };

    match event {
        ClientEvent::JoinRoom { room_id } => {
            match chat::load_room(state, principal, &room_id).await {
                Ok((rid, _room)) => {
                    state.registry.join_room(channel_id, rid);
                    push_to_channel(
                        state,
                        channel_id,
                        &ServerEvent::RoomJoined { room_id: rid.to_hex() },
                    )
                    .await;
                    // Opening a room acknowledges everything addressed to
                    // this party; failures here only delay the sweep.
                    if let Err(e) = chat::mark_read(state, principal, rid, None).await {
                        warn!(user_id = %principal.id, room_id = %rid, %e, "Join-room read sweep failed");
                    }
                }
                Err(e) => send_error(state, channel_id, &e).await,
            }
        }
        ClientEvent::LeaveRoom { room_id } => {
            if let Ok(rid) = ObjectId::parse_str(&room_id) {
                state.registry.leave_room(channel_id, rid);
            }
        }
        ClientEvent::SendMessage { room_id, message, kind } => {
            let result = match chat::load_room(state, principal, &room_id).await {
                Ok((rid, _)) => chat::post_message(state, principal, rid, message, kind)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                send_error(state, channel_id, &e).await;
            }
        }
        ClientEvent::Typing { room_id } => {
            relay_typing(state, principal, channel_id, &room_id, true).await;
        }
        ClientEvent::StopTyping { room_id } => {
            relay_typing(state, principal, channel_id, &room_id, false).await;
        }
        ClientEvent::MarkRead { room_id, message_ids } => {
            let ids: Vec<ObjectId> = message_ids
                .iter()
                .filter_map(|s| ObjectId::parse_str(s).ok())
                .collect();
            let result = match chat::load_room(state, principal, &room_id).await {
                Ok((rid, _)) => chat::mark_read(state, principal, rid, Some(ids))
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                send_error(state, channel_id, &e).await;
            }
        }
        ClientEvent::Ping => {
            push_to_channel(state, channel_id, &ServerEvent::Pong).await;
        }
    }
}

async fn relay_typing(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    room_id: &str,
    started: bool,
) {
    // Access-checked like any other room operation, but failures are
    // swallowed: typing is best-effort.
    if let Ok((rid, _)) = chat::load_room(state, principal, room_id).await {
        chat::relay_typing(state, principal, rid, started, channel_id);
    }
}

/// Pushes to a single channel and reaps it (with presence) if its writer
/// is gone.
async fn push_to_channel(state: &AppState, channel_id: &str, event: &ServerEvent) {
    let dead = dispatcher::send_to_channel(&state.registry, channel_id, event);
    chat::cleanup_channels(state, dead).await;
}

async fn send_error(state: &AppState, channel_id: &str, err: &ApiError) {
    push_to_channel(
        state,
        channel_id,
        &ServerEvent::Error {
            code: err.code().to_string(),
            message: err.message().to_string(),
        },
    )
    .await;
}
