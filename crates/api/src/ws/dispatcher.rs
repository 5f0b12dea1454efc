use tracing::warn;

use super::protocol::ServerEvent;
use super::registry::{ChannelId, ChannelSender, SessionRegistry};

/// Pushes one event to every target channel, serializing once. Delivery is
/// fire-and-forget, at-most-once per channel: durability lives in the room
/// store, and clients de-duplicate by message id.
///
/// Returns the ids of channels whose writer is gone, so the caller can
/// treat them as effectively offline and clean up the registry. A dead
/// recipient never stalls or fails delivery to the rest.
pub fn fanout(targets: &[(ChannelId, ChannelSender)], event: &ServerEvent) -> Vec<ChannelId> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(%e, "Failed to serialize WS event");
            return Vec::new();
        }
    };

    let mut dead = Vec::new();
    for (channel_id, sender) in targets {
        if sender.send(text.clone()).is_err() {
            warn!(%channel_id, "WS channel closed, dropping");
            dead.push(channel_id.clone());
        }
    }
    dead
}

/// Sends one event to a single channel by id. A dead channel comes back
/// in the returned list, still registered, so the caller can reap it with
/// the same presence handling as any other dead channel.
pub fn send_to_channel(
    registry: &SessionRegistry,
    channel_id: &str,
    event: &ServerEvent,
) -> Vec<ChannelId> {
    match registry.sender_for(channel_id) {
        Some(sender) => fanout(&[(channel_id.to_string(), sender)], event),
        None => Vec::new(),
    }
}
