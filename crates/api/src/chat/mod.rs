//! The single path through which messages become durable and are fanned
//! out, plus the read-receipt handling that keeps the two per-room unread
//! counters honest.
//!
//! Both ingress paths, the WebSocket handler and the REST routes, go
//! through these functions, so realtime and fallback submissions behave
//! identically.

pub mod presence;

use std::collections::HashSet;

use bson::{DateTime, oid::ObjectId};
use dashmap::DashMap;
use std::sync::Arc;
use storechat_db::models::{ChatMessage, MessageKind, Role, Room, RoomStatus};
use storechat_services::auth::Principal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws::dispatcher;
use crate::ws::protocol::{MessagePayload, PrincipalPayload, ServerEvent};
use crate::ws::registry::{ChannelId, ChannelSender};

/// One async mutex per room. Every operation that touches a room's mutable
/// state (counters, status, last-message fields) runs under its lock, so
/// concurrent sends and receipts for the same room serialize while
/// different rooms proceed fully in parallel. Fan-out happens while the
/// lock is still held, which is what keeps delivery order identical to
/// persistence order for all subscribers.
pub struct RoomLocks {
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    pub async fn acquire(&self, room_id: ObjectId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(room_id).or_default().clone();
        lock.lock_owned().await
    }
}

impl Default for RoomLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a client-supplied room id and loads the room, enforcing that a
/// customer can only ever reach their own room. Staff may reach any room.
pub async fn load_room(
    state: &AppState,
    principal: &Principal,
    room_id: &str,
) -> Result<(ObjectId, Room), ApiError> {
    let rid = ObjectId::parse_str(room_id)
        .map_err(|_| ApiError::BadRequest("Invalid room_id".to_string()))?;

    let room = match state.rooms.base.find_one(bson::doc! { "_id": rid }).await? {
        Some(room) => room,
        None => return Err(ApiError::NotFound("Room not found".to_string())),
    };

    if principal.role == Role::Customer && room.customer_id != principal.id {
        // Don't leak the existence of other customers' rooms.
        return Err(ApiError::NotFound("Room not found".to_string()));
    }

    Ok((rid, room))
}

/// Validates, persists and fans out one message. One logical send maps to
/// exactly one message id; identical bodies sent twice (double-click) are
/// two distinct messages, each counted once.
pub async fn post_message(
    state: &AppState,
    sender: &Principal,
    room_id: ObjectId,
    body: String,
    kind: MessageKind,
) -> Result<ChatMessage, ApiError> {
    let body = body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::Validation("Message body must not be empty".to_string()));
    }
    let max_len = state.settings.chat.max_message_len;
    if body.chars().count() > max_len {
        return Err(ApiError::Validation(format!(
            "Message body exceeds {max_len} characters"
        )));
    }

    let _guard = state.room_locks.acquire(room_id).await;

    let room = state.rooms.base.find_by_id(room_id).await?;
    if sender.role == Role::Customer && room.customer_id != sender.id {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }
    if room.status == RoomStatus::Closed {
        // In-flight sends against a room closed underneath the sender are
        // rejected, not silently accepted into the closed room.
        return Err(ApiError::Conflict("Room is closed".to_string()));
    }

    let message = state
        .messages
        .create(room_id, sender.id, sender.role, &sender.display_name, body, kind)
        .await?;

    let preview: String = message
        .body
        .chars()
        .take(state.settings.chat.preview_len)
        .collect();
    if let Err(e) = state
        .rooms
        .record_message(room_id, &preview, message.created_at, sender.role.counterpart())
        .await
    {
        // The caller is about to be told the send failed, so the message
        // must not survive either: a persisted-but-uncounted message would
        // make the retry a duplicate.
        if let Some(id) = message.id
            && let Err(del) = state.messages.delete(id).await
        {
            error!(room_id = %room_id, message_id = %id, %del, "Failed to discard uncounted message");
        }
        return Err(e.into());
    }

    if sender.role == Role::Staff {
        state.rooms.assign_staff_if_unset(room_id, sender.id).await?;
    }

    debug!(room_id = %room_id, sender_id = %sender.id, "Message persisted");

    let payload = MessagePayload::from(message.clone());
    let dead = fanout_message(state, sender, room.customer_id, room_id, payload);
    cleanup_channels(state, dead).await;

    Ok(message)
}

/// Fan-out set for a persisted message:
/// (a) every channel subscribed to the room,
/// (b) the sender's own channels (other tabs of the same user),
/// (c) the room owner's channels,
/// and a badge-only notification to staff channels not viewing this room.
fn fanout_message(
    state: &AppState,
    sender: &Principal,
    customer_id: ObjectId,
    room_id: ObjectId,
    payload: MessagePayload,
) -> Vec<ChannelId> {
    let registry = &state.registry;
    let room_id_hex = room_id.to_hex();

    let mut targets = registry.room_subscribers(room_id);
    let mut seen: HashSet<ChannelId> = targets.iter().map(|(id, _)| id.clone()).collect();
    push_unseen(&mut targets, registry.channels_for(sender.id), &mut seen);
    push_unseen(&mut targets, registry.channels_for(customer_id), &mut seen);

    let mut dead = dispatcher::fanout(
        &targets,
        &ServerEvent::NewMessage { room_id: room_id_hex.clone(), message: payload.clone() },
    );

    let badge_targets: Vec<_> = registry
        .staff_channels()
        .into_iter()
        .filter(|(id, _)| !seen.contains(id))
        .collect();
    dead.extend(dispatcher::fanout(
        &badge_targets,
        &ServerEvent::NewMessageNotification { room_id: room_id_hex, message: payload },
    ));

    dead
}

fn push_unseen(
    targets: &mut Vec<(ChannelId, ChannelSender)>,
    extra: Vec<(ChannelId, ChannelSender)>,
    seen: &mut HashSet<ChannelId>,
) {
    for (id, sender) in extra {
        if seen.insert(id.clone()) {
            targets.push((id, sender));
        }
    }
}

/// Marks a batch of messages as read by `reader` and reconciles the
/// reader's unread counter. `within = None` sweeps everything currently
/// unread and addressed to the reader (used when a party opens the room).
///
/// Only messages that actually transition unread→read are counted, so
/// replayed or overlapping receipt batches after a reconnect are no-ops.
pub async fn mark_read(
    state: &AppState,
    reader: &Principal,
    room_id: ObjectId,
    within: Option<Vec<ObjectId>>,
) -> Result<(Vec<ObjectId>, DateTime), ApiError> {
    let _guard = state.room_locks.acquire(room_id).await;

    let room = state.rooms.base.find_by_id(room_id).await?;
    if reader.role == Role::Customer && room.customer_id != reader.id {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }

    let newly_read = state
        .messages
        .unread_ids(room_id, reader.role, within.as_deref())
        .await?;
    let read_at = DateTime::now();

    if newly_read.is_empty() {
        return Ok((newly_read, read_at));
    }

    state.messages.mark_read(&newly_read, read_at).await?;
    state
        .rooms
        .decrement_unread(room_id, reader.role, newly_read.len() as i64)
        .await?;

    let event = ServerEvent::MessagesRead {
        room_id: room_id.to_hex(),
        message_ids: newly_read.iter().map(|id| id.to_hex()).collect(),
        read_at: read_at.try_to_rfc3339_string().unwrap_or_default(),
    };

    // Receipts travel to the same audience as the message itself, so a
    // staff console showing only the room list still clears its badge
    // live.
    let registry = &state.registry;
    let mut targets = registry.room_subscribers(room_id);
    let mut seen: HashSet<ChannelId> = targets.iter().map(|(id, _)| id.clone()).collect();
    push_unseen(&mut targets, registry.channels_for(reader.id), &mut seen);
    push_unseen(&mut targets, registry.channels_for(room.customer_id), &mut seen);
    push_unseen(&mut targets, registry.staff_channels(), &mut seen);

    let dead = dispatcher::fanout(&targets, &event);
    cleanup_channels(state, dead).await;

    Ok((newly_read, read_at))
}

/// Relays a typing signal to the room's other observers. Never persisted:
/// a lost signal degrades UX, never correctness, and observers expire a
/// stale `typing` on their own timer.
pub fn relay_typing(
    state: &AppState,
    principal: &Principal,
    room_id: ObjectId,
    started: bool,
    origin_channel: &str,
) {
    let targets: Vec<_> = state
        .registry
        .room_subscribers(room_id)
        .into_iter()
        .filter(|(id, _)| id != origin_channel)
        .collect();

    let user = PrincipalPayload::from(principal);
    let room_id = room_id.to_hex();
    let event = if started {
        ServerEvent::UserTyping { room_id, user }
    } else {
        ServerEvent::UserStopTyping { room_id, user }
    };

    // Best-effort: dead channels get reaped by their own socket task.
    let _ = dispatcher::fanout(&targets, &event);
}

/// Drops channels whose writer is gone and emits the presence transitions
/// that result, as if each had disconnected normally.
pub async fn cleanup_channels(state: &AppState, dead: Vec<ChannelId>) {
    for channel_id in dead {
        if let Some(gone) = state.registry.unregister(&channel_id) {
            warn!(%channel_id, user_id = %gone.principal.id, "Reaped unreachable channel");
            if gone.went_offline {
                presence::broadcast_offline(state, &gone.principal, gone.staff_pool_offline)
                    .await;
            }
        }
    }
}
