//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::WorldHandle;
use crate::store::PlayerStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: PlayerStore,
    pub world: WorldHandle,
}

impl AppState {
    pub fn new(config: Config, store: PlayerStore, world: WorldHandle) -> Self {
        Self {
            config: Arc::new(config),
            store,
            world,
        }
    }
}
