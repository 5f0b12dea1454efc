//! Client-side view of one conversation.
//!
//! Messages reach a client over two paths that overlap freely: realtime
//! pushes on the duplex channel, and REST history pages fetched on open or
//! reconnect. `ConversationState` merges both by message id into a single
//! log ordered by `(created_at, id)`, so replays and out-of-order arrivals
//! converge on the same transcript everywhere.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use storechat_api::ws::protocol::{MessagePayload, PrincipalPayload, ServerEvent};

pub struct ConversationState {
    room_id: String,
    messages: Vec<MessagePayload>,
    ids: HashSet<String>,
    typing: Option<TypingSlot>,
    typing_ttl: Duration,
    unread: i64,
}

struct TypingSlot {
    user: PrincipalPayload,
    deadline: Instant,
}

impl ConversationState {
    pub fn new(room_id: impl Into<String>, typing_ttl: Duration) -> Self {
        Self {
            room_id: room_id.into(),
            messages: Vec::new(),
            ids: HashSet::new(),
            typing: None,
            typing_ttl,
            unread: 0,
        }
    }

    /// Applies one server push. Events for other rooms are ignored, as are
    /// event kinds that carry no conversation state (presence, pong).
    pub fn apply(&mut self, event: &ServerEvent, now: Instant) {
        match event {
            ServerEvent::NewMessage { room_id, message }
            | ServerEvent::NewMessageNotification { room_id, message }
                if *room_id == self.room_id =>
            {
                self.insert(message.clone());
            }
            ServerEvent::MessagesRead { room_id, message_ids, read_at }
                if *room_id == self.room_id =>
            {
                self.apply_read(message_ids, read_at);
            }
            ServerEvent::UserTyping { room_id, user } if *room_id == self.room_id => {
                self.typing = Some(TypingSlot {
                    user: user.clone(),
                    deadline: now + self.typing_ttl,
                });
            }
            ServerEvent::UserStopTyping { room_id, user } if *room_id == self.room_id => {
                if self.typing.as_ref().is_some_and(|slot| slot.user.id == user.id) {
                    self.typing = None;
                }
            }
            _ => {}
        }
    }

    /// Merges a history page. Messages already present (delivered live
    /// while the page was in flight) are kept as-is.
    pub fn merge_history(&mut self, page: Vec<MessagePayload>) {
        for message in page {
            self.insert(message);
        }
    }

    fn insert(&mut self, message: MessagePayload) {
        if !self.ids.insert(message.id.clone()) {
            return;
        }
        let key = sort_key(&message);
        let pos = self
            .messages
            .partition_point(|existing| sort_key(existing) <= key);
        self.messages.insert(pos, message);
    }

    fn apply_read(&mut self, message_ids: &[String], read_at: &str) {
        for message in &mut self.messages {
            if message_ids.contains(&message.id) && !message.is_read {
                message.is_read = true;
                message.read_at = Some(read_at.to_string());
            }
        }
    }

    pub fn messages(&self) -> &[MessagePayload] {
        &self.messages
    }

    /// Who is typing right now, if the indicator has not expired. A lost
    /// `user_stop_typing` only ever leaves the indicator up until the
    /// deadline.
    pub fn typing(&self, now: Instant) -> Option<&PrincipalPayload> {
        self.typing
            .as_ref()
            .filter(|slot| now < slot.deadline)
            .map(|slot| &slot.user)
    }

    /// The unread badge comes verbatim from server-side room counters and
    /// is never recomputed from the local log.
    pub fn set_unread(&mut self, unread: i64) {
        self.unread = unread;
    }

    pub fn unread(&self) -> i64 {
        self.unread
    }
}

fn sort_key(message: &MessagePayload) -> (Option<DateTime<FixedOffset>>, &str) {
    (
        DateTime::parse_from_rfc3339(&message.created_at).ok(),
        message.id.as_str(),
    )
}
