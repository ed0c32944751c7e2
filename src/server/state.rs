use axum::extract::FromRef;

use std::sync::Arc;
use std::time::Instant;

use crate::notifications::NotificationEngine;
use crate::portal_store::FullPortalStore;

use super::ServerConfig;

pub type GuardedPortalStore = Arc<dyn FullPortalStore>;
pub type GuardedNotificationEngine = Arc<NotificationEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedPortalStore,
    pub engine: GuardedNotificationEngine,
}

impl FromRef<ServerState> for GuardedPortalStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedNotificationEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.engine.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
