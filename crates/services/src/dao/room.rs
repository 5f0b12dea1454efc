use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use storechat_db::models::{Role, Room, RoomStatus};
use tracing::debug;

use super::base::{BaseDao, DaoError, DaoResult, PaginatedResult, PaginationParams};

pub struct RoomDao {
    pub base: BaseDao<Room>,
}

impl RoomDao {
    pub fn new(db: &Database) -> Self {
        Self { base: BaseDao::new(db, Room::COLLECTION) }
    }

    /// Resolves the single room for a customer, creating it on first
    /// contact. Concurrent callers collapse onto one room: if the insert
    /// loses the race on the unique customer_id index, the winner's room is
    /// re-fetched and returned instead of erroring.
    pub async fn get_or_create(
        &self,
        customer_id: ObjectId,
        customer_name: &str,
    ) -> DaoResult<Room> {
        if let Some(room) = self
            .base
            .find_one(doc! { "customer_id": customer_id })
            .await?
        {
            return Ok(room);
        }

        let now = DateTime::now();
        let room = Room {
            id: None,
            customer_id,
            customer_name: customer_name.to_string(),
            assigned_staff_id: None,
            status: RoomStatus::Active,
            last_message_preview: None,
            last_message_at: None,
            unread_for_customer: 0,
            unread_for_staff: 0,
            closed_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.base.insert_one(&room).await {
            Ok(id) => self.base.find_by_id(id).await,
            Err(DaoError::DuplicateKey(_)) => {
                debug!(%customer_id, "Room creation race lost, returning winner");
                self.base
                    .find_one(doc! { "customer_id": customer_id })
                    .await?
                    .ok_or(DaoError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_customer(&self, customer_id: ObjectId) -> DaoResult<Option<Room>> {
        self.base.find_one(doc! { "customer_id": customer_id }).await
    }

    /// Closes the room. Message history and counters are untouched.
    pub async fn close(&self, room_id: ObjectId) -> DaoResult<bool> {
        let now = DateTime::now();
        self.base
            .update_by_id(
                room_id,
                doc! {
                    "$set": {
                        "status": "closed",
                        "closed_at": now,
                        "updated_at": now,
                    }
                },
            )
            .await
    }

    /// Reopens a closed room: both unread counters reset, closed_at cleared.
    pub async fn reopen(&self, room_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_by_id(
                room_id,
                doc! {
                    "$set": {
                        "status": "active",
                        "closed_at": null,
                        "unread_for_customer": 0,
                        "unread_for_staff": 0,
                        "updated_at": DateTime::now(),
                    }
                },
            )
            .await
    }

    /// Staff-facing room list: optional status filter, optional search over
    /// customer name and last-message preview, most recent activity first.
    pub async fn list(
        &self,
        status: Option<RoomStatus>,
        search: Option<&str>,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Room>> {
        let mut filter = doc! {};

        if let Some(status) = status {
            filter.insert("status", bson::to_bson(&status)?);
        }

        if let Some(query) = search.filter(|q| !q.trim().is_empty()) {
            let escaped = escape_regex(query.trim());
            filter.insert(
                "$or",
                vec![
                    doc! { "customer_name": { "$regex": &escaped, "$options": "i" } },
                    doc! { "last_message_preview": { "$regex": &escaped, "$options": "i" } },
                ],
            );
        }

        self.base
            .find_paginated(
                filter,
                Some(doc! { "last_message_at": -1, "created_at": -1 }),
                params,
            )
            .await
    }

    /// Applies a freshly persisted message to the room's denormalized
    /// fields and bumps the recipient side's unread counter.
    pub async fn record_message(
        &self,
        room_id: ObjectId,
        preview: &str,
        at: DateTime,
        recipient: Role,
    ) -> DaoResult<bool> {
        self.base
            .update_by_id(
                room_id,
                doc! {
                    "$set": {
                        "last_message_preview": preview,
                        "last_message_at": at,
                        "updated_at": at,
                    },
                    "$inc": { unread_field(recipient): 1_i64 },
                },
            )
            .await
    }

    /// Lazily pins the first replying staff member onto the room.
    pub async fn assign_staff_if_unset(
        &self,
        room_id: ObjectId,
        staff_id: ObjectId,
    ) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": room_id, "assigned_staff_id": null },
                doc! { "$set": { "assigned_staff_id": staff_id } },
            )
            .await
    }

    /// Decrements the reader's unread counter by the number of messages
    /// actually transitioned unread→read, clamped at zero. The clamp uses a
    /// pipeline update so an out-of-order receipt batch can never drive the
    /// counter negative.
    pub async fn decrement_unread(
        &self,
        room_id: ObjectId,
        reader: Role,
        by: i64,
    ) -> DaoResult<bool> {
        let field = unread_field(reader);
        self.base
            .update_by_id(
                room_id,
                vec![doc! {
                    "$set": {
                        field: { "$max": [0, { "$subtract": [format!("${field}"), by] }] },
                        "updated_at": "$$NOW",
                    }
                }],
            )
            .await
    }
}

fn unread_field(side: Role) -> &'static str {
    match side {
        Role::Customer => "unread_for_customer",
        Role::Staff => "unread_for_staff",
    }
}

fn escape_regex(query: &str) -> String {
    query
        .chars()
        .flat_map(|c| {
            if ".*+?^${}()|[]\\".contains(c) {
                vec!['\\', c]
            } else {
                vec![c]
            }
        })
        .collect()
}
