use std::sync::Arc;

use mongodb::Database;
use storechat_config::Settings;
use storechat_services::auth::AuthService;
use storechat_services::dao::{MessageDao, RoomDao};

use crate::chat::RoomLocks;
use crate::ws::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
    pub rooms: Arc<RoomDao>,
    pub messages: Arc<MessageDao>,
    pub registry: Arc<SessionRegistry>,
    pub room_locks: Arc<RoomLocks>,
}

impl AppState {
    pub fn new(settings: Settings, db: &Database) -> Self {
        let auth = Arc::new(AuthService::new(&settings.auth.jwt_secret));
        Self {
            settings: Arc::new(settings),
            auth,
            rooms: Arc::new(RoomDao::new(db)),
            messages: Arc::new(MessageDao::new(db)),
            registry: Arc::new(SessionRegistry::new()),
            room_locks: Arc::new(RoomLocks::new()),
        }
    }
}
