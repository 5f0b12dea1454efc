//! Wire protocol for the duplex channel.
//!
//! Frames are JSON objects `{"type": "...", "data": {...}}`. Inbound and
//! outbound events are closed enums, so adding an operation is a
//! compile-time-checked change rather than a new string constant scattered
//! across client and server.

use serde::{Deserialize, Serialize};
use storechat_db::models::{ChatMessage, MessageKind, Role};
use storechat_services::auth::Principal;

/// Events a client may send over an established channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    SendMessage {
        room_id: String,
        message: String,
        #[serde(default)]
        kind: MessageKind,
    },
    Typing { room_id: String },
    StopTyping { room_id: String },
    MarkRead { room_id: String, message_ids: Vec<String> },
    Ping,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomJoined { room_id: String },
    NewMessage { room_id: String, message: MessagePayload },
    /// Badge-only push for staff channels not subscribed to the room.
    NewMessageNotification { room_id: String, message: MessagePayload },
    UserTyping { room_id: String, user: PrincipalPayload },
    UserStopTyping { room_id: String, user: PrincipalPayload },
    MessagesRead {
        room_id: String,
        message_ids: Vec<String>,
        read_at: String,
    },
    AdminOnline,
    AdminOffline,
    UserOnline {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        user_id: String,
    },
    UserOffline {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        user_id: String,
    },
    Error { code: String, message: String },
    Pong,
}

/// The message shape shared by realtime pushes and REST history responses,
/// so clients can merge both paths by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_role: Role,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
}

impl From<ChatMessage> for MessagePayload {
    fn from(m: ChatMessage) -> Self {
        MessagePayload {
            id: m.id.map(|id| id.to_hex()).unwrap_or_default(),
            room_id: m.room_id.to_hex(),
            sender_id: m.sender_id.to_hex(),
            sender_role: m.sender_role,
            sender_name: m.sender_name,
            body: m.body,
            kind: m.kind,
            created_at: m.created_at.try_to_rfc3339_string().unwrap_or_default(),
            is_read: m.is_read,
            read_at: m.read_at.and_then(|t| t.try_to_rfc3339_string().ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalPayload {
    pub id: String,
    pub role: Role,
    pub display_name: String,
}

impl From<&Principal> for PrincipalPayload {
    fn from(p: &Principal) -> Self {
        PrincipalPayload {
            id: p.id.to_hex(),
            role: p.role,
            display_name: p.display_name.clone(),
        }
    }
}
