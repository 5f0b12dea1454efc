use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// One support conversation. Exactly one per customer, ever; the unique
/// index on `customer_id` (see `indexes.rs`) backs that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub customer_id: ObjectId,
    pub customer_name: String,
    /// Set lazily when a staff member first replies; not required to send.
    pub assigned_staff_id: Option<ObjectId>,
    pub status: RoomStatus,
    /// Denormalized for the staff room list.
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime>,
    /// Staff-sent messages the customer has not read yet.
    #[serde(default)]
    pub unread_for_customer: i64,
    /// Customer-sent messages no staff member has read yet. Shared across
    /// the whole pool; staff are not individually assigned by default.
    #[serde(default)]
    pub unread_for_staff: i64,
    pub closed_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Room {
    pub const COLLECTION: &'static str = "support_rooms";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Closed,
}
