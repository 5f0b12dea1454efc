use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub room_id: ObjectId,
    pub sender_id: ObjectId,
    pub sender_role: Role,
    pub sender_name: String,
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub created_at: DateTime,
    /// Read state from the perspective of the *other* party.
    #[serde(default)]
    pub is_read: bool,
    pub read_at: Option<DateTime>,
}

impl ChatMessage {
    pub const COLLECTION: &'static str = "support_messages";
}

/// Actor role, used both for message senders and authenticated principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
}

impl Role {
    /// The side that receives (and therefore reads) messages sent by `self`.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Customer => Role::Staff,
            Role::Staff => Role::Customer,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
}
