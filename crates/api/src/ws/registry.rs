use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use bson::oid::ObjectId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use storechat_db::models::Role;
use storechat_services::auth::Principal;
use tokio::sync::mpsc;

pub type ChannelId = String;

/// Handle to one live duplex channel. Events are queued as pre-serialized
/// JSON and drained by the connection's writer task, so fan-out never
/// blocks on a slow socket.
pub type ChannelSender = mpsc::UnboundedSender<String>;

struct PrincipalSessions {
    role: Role,
    channels: Vec<(ChannelId, ChannelSender)>,
}

struct ChannelEntry {
    principal: Principal,
    sender: ChannelSender,
    rooms: HashSet<ObjectId>,
}

/// Outcome of [`SessionRegistry::register`].
pub struct Registered {
    /// First live channel for this principal (offline to online).
    pub went_online: bool,
    /// This registration brought the staff pool from zero to one online
    /// operator.
    pub staff_pool_online: bool,
}

/// Outcome of [`SessionRegistry::unregister`].
pub struct Unregistered {
    pub principal: Principal,
    /// Last live channel for this principal (online to offline).
    pub went_offline: bool,
    /// This removal took the last online operator out of the staff pool.
    pub staff_pool_offline: bool,
}

/// Tracks every live channel by principal and by channel id, plus which
/// channels are subscribed to which room. A principal may hold several
/// concurrent channels (multiple tabs/devices).
///
/// Constructed once at startup and handed to everything that needs it via
/// `AppState`; never a global.
pub struct SessionRegistry {
    principals: DashMap<ObjectId, PrincipalSessions>,
    channels: DashMap<ChannelId, ChannelEntry>,
    room_subs: DashMap<ObjectId, HashSet<ChannelId>>,
    online_staff: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            principals: DashMap::new(),
            channels: DashMap::new(),
            room_subs: DashMap::new(),
            online_staff: AtomicUsize::new(0),
        }
    }

    /// Adds a channel under its principal. The online decision is made
    /// under the principal's map entry, so it cannot race a concurrent
    /// connect/disconnect of the same principal. The staff-pool counter
    /// moves atomically with the online transition, so of two racing
    /// first-channel staff logins exactly one observes the empty pool.
    pub fn register(
        &self,
        channel_id: &str,
        principal: Principal,
        sender: ChannelSender,
    ) -> Registered {
        self.channels.insert(
            channel_id.to_string(),
            ChannelEntry {
                principal: principal.clone(),
                sender: sender.clone(),
                rooms: HashSet::new(),
            },
        );

        let mut sessions = self
            .principals
            .entry(principal.id)
            .or_insert_with(|| PrincipalSessions { role: principal.role, channels: Vec::new() });
        let went_online = sessions.channels.is_empty();
        sessions.channels.push((channel_id.to_string(), sender));

        let staff_pool_online = went_online
            && principal.role == Role::Staff
            && self.online_staff.fetch_add(1, Ordering::SeqCst) == 0;

        Registered { went_online, staff_pool_online }
    }

    /// Removes a channel and all its room subscriptions. Safe to call more
    /// than once per channel; the second call is a no-op.
    pub fn unregister(&self, channel_id: &str) -> Option<Unregistered> {
        let (_, entry) = self.channels.remove(channel_id)?;

        for room_id in &entry.rooms {
            if let Entry::Occupied(mut occ) = self.room_subs.entry(*room_id) {
                occ.get_mut().remove(channel_id);
                if occ.get().is_empty() {
                    occ.remove();
                }
            }
        }

        let mut went_offline = false;
        if let Entry::Occupied(mut occ) = self.principals.entry(entry.principal.id) {
            occ.get_mut().channels.retain(|(id, _)| id != channel_id);
            if occ.get().channels.is_empty() {
                occ.remove();
                went_offline = true;
            }
        }

        let staff_pool_offline = went_offline
            && entry.principal.role == Role::Staff
            && self.online_staff.fetch_sub(1, Ordering::SeqCst) == 1;

        Some(Unregistered {
            principal: entry.principal,
            went_offline,
            staff_pool_offline,
        })
    }

    /// Live channels for a principal; empty when offline (fan-out to zero
    /// channels is not an error).
    pub fn channels_for(&self, principal_id: ObjectId) -> Vec<(ChannelId, ChannelSender)> {
        self.principals
            .get(&principal_id)
            .map(|s| s.channels.clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, principal_id: ObjectId) -> bool {
        self.principals.contains_key(&principal_id)
    }

    pub fn sender_for(&self, channel_id: &str) -> Option<ChannelSender> {
        self.channels.get(channel_id).map(|e| e.sender.clone())
    }

    /// Subscribes a channel to a room's fan-out. Returns `false` for an
    /// unknown channel.
    pub fn join_room(&self, channel_id: &str, room_id: ObjectId) -> bool {
        let Some(mut entry) = self.channels.get_mut(channel_id) else {
            return false;
        };
        entry.rooms.insert(room_id);
        drop(entry);

        self.room_subs
            .entry(room_id)
            .or_default()
            .insert(channel_id.to_string());
        true
    }

    pub fn leave_room(&self, channel_id: &str, room_id: ObjectId) {
        if let Some(mut entry) = self.channels.get_mut(channel_id) {
            entry.rooms.remove(&room_id);
        }
        if let Entry::Occupied(mut occ) = self.room_subs.entry(room_id) {
            occ.get_mut().remove(channel_id);
            if occ.get().is_empty() {
                occ.remove();
            }
        }
    }

    pub fn is_subscribed(&self, channel_id: &str, room_id: ObjectId) -> bool {
        self.channels
            .get(channel_id)
            .map(|e| e.rooms.contains(&room_id))
            .unwrap_or(false)
    }

    pub fn room_subscribers(&self, room_id: ObjectId) -> Vec<(ChannelId, ChannelSender)> {
        let Some(ids) = self.room_subs.get(&room_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                self.channels
                    .get(id)
                    .map(|e| (id.clone(), e.sender.clone()))
            })
            .collect()
    }

    pub fn staff_channels(&self) -> Vec<(ChannelId, ChannelSender)> {
        self.channels_by_role(Role::Staff)
    }

    pub fn customer_channels(&self) -> Vec<(ChannelId, ChannelSender)> {
        self.channels_by_role(Role::Customer)
    }

    pub fn online_staff_count(&self) -> usize {
        self.online_staff.load(Ordering::SeqCst)
    }

    fn channels_by_role(&self, role: Role) -> Vec<(ChannelId, ChannelSender)> {
        self.principals
            .iter()
            .filter(|entry| entry.value().role == role)
            .flat_map(|entry| entry.value().channels.clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
