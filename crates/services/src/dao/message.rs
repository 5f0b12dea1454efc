use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use storechat_db::models::{ChatMessage, MessageKind, Role};

use super::base::{BaseDao, DaoResult, PaginatedResult, PaginationParams};

pub struct MessageDao {
    pub base: BaseDao<ChatMessage>,
}

impl MessageDao {
    pub fn new(db: &Database) -> Self {
        Self { base: BaseDao::new(db, ChatMessage::COLLECTION) }
    }

    pub async fn create(
        &self,
        room_id: ObjectId,
        sender_id: ObjectId,
        sender_role: Role,
        sender_name: &str,
        body: String,
        kind: MessageKind,
    ) -> DaoResult<ChatMessage> {
        let message = ChatMessage {
            id: None,
            room_id,
            sender_id,
            sender_role,
            sender_name: sender_name.to_string(),
            body,
            kind,
            created_at: DateTime::now(),
            is_read: false,
            read_at: None,
        };
        let id = self.base.insert_one(&message).await?;
        self.base.find_by_id(id).await
    }

    /// Removes a message entirely. Only used to discard a message whose
    /// room bookkeeping failed, so the caller can report the send as
    /// failed without leaving a durable trace.
    pub async fn delete(&self, id: ObjectId) -> DaoResult<bool> {
        self.base.delete_by_id(id).await
    }

    /// History pages in durable order: (created_at, _id) ascending, the
    /// same order realtime consumers converge on.
    pub async fn find_in_room(
        &self,
        room_id: ObjectId,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<ChatMessage>> {
        self.base
            .find_paginated(
                doc! { "room_id": room_id },
                Some(doc! { "created_at": 1, "_id": 1 }),
                params,
            )
            .await
    }

    /// Ids of messages addressed to `reader` that are still unread,
    /// optionally restricted to a client-submitted id batch.
    pub async fn unread_ids(
        &self,
        room_id: ObjectId,
        reader: Role,
        within: Option<&[ObjectId]>,
    ) -> DaoResult<Vec<ObjectId>> {
        let mut filter = doc! {
            "room_id": room_id,
            "sender_role": bson::to_bson(&reader.counterpart())?,
            "is_read": false,
        };
        if let Some(ids) = within {
            filter.insert("_id", doc! { "$in": ids });
        }

        let messages = self
            .base
            .find_many(filter, Some(doc! { "created_at": 1, "_id": 1 }))
            .await?;
        Ok(messages.into_iter().filter_map(|m| m.id).collect())
    }

    /// Flips is_read on the given batch; returns how many actually
    /// transitioned (already-read ids are a no-op).
    pub async fn mark_read(
        &self,
        ids: &[ObjectId],
        read_at: DateTime,
    ) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! { "_id": { "$in": ids }, "is_read": false },
                doc! { "$set": { "is_read": true, "read_at": read_at } },
            )
            .await
    }
}
