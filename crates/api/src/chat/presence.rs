//! Presence is derived purely from Session Registry occupancy and never
//! persisted. Customers learn whether *an* operator is online, not which
//! one; staff learn when a specific customer comes and goes.

use storechat_db::models::Role;
use storechat_services::auth::Principal;
use tracing::debug;

use crate::state::AppState;
use crate::ws::dispatcher;
use crate::ws::protocol::ServerEvent;

/// Called after a principal's first channel registers. `first_operator`
/// is the staff pool's 0→1 transition, computed atomically by the
/// registry so two near-simultaneous logins cannot both skip (or both
/// claim) it.
pub async fn broadcast_online(state: &AppState, principal: &Principal, first_operator: bool) {
    match principal.role {
        Role::Staff => {
            // Pooled semantics: customers only care about the 0→1 operator
            // transition, not each individual staff login.
            if first_operator {
                debug!(staff_id = %principal.id, "First operator online");
                let _ = dispatcher::fanout(
                    &state.registry.customer_channels(),
                    &ServerEvent::AdminOnline,
                );
            }
        }
        Role::Customer => {
            let room_id = room_id_for(state, principal).await;
            let _ = dispatcher::fanout(
                &state.registry.staff_channels(),
                &ServerEvent::UserOnline { room_id, user_id: principal.id.to_hex() },
            );
        }
    }
}

/// Called after a principal's last channel unregisters. `last_operator`
/// is the staff pool's 1→0 transition, from the registry.
pub async fn broadcast_offline(state: &AppState, principal: &Principal, last_operator: bool) {
    match principal.role {
        Role::Staff => {
            if last_operator {
                debug!(staff_id = %principal.id, "Last operator offline");
                let _ = dispatcher::fanout(
                    &state.registry.customer_channels(),
                    &ServerEvent::AdminOffline,
                );
            }
        }
        Role::Customer => {
            let room_id = room_id_for(state, principal).await;
            let _ = dispatcher::fanout(
                &state.registry.staff_channels(),
                &ServerEvent::UserOffline { room_id, user_id: principal.id.to_hex() },
            );
        }
    }
}

/// A customer may connect before ever opening a room; presence events then
/// simply omit the room id. Lookup failures are swallowed, presence stays
/// best-effort.
async fn room_id_for(state: &AppState, customer: &Principal) -> Option<String> {
    state
        .rooms
        .find_by_customer(customer.id)
        .await
        .ok()
        .flatten()
        .and_then(|room| room.id)
        .map(|id| id.to_hex())
}
