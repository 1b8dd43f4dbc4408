//! Player record persistence
//!
//! The simulation only ever writes through here asynchronously; a slow or
//! failing store never holds up a tick.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::game::entity::{Direction, PlayerAction, PlayerId, Vec2};

use super::supabase::{eq, SupabaseClient, SupabaseError};

const PLAYERS_TABLE: &str = "players";

const PROBE_INITIAL_DELAY: Duration = Duration::from_secs(1);
const PROBE_MAX_DELAY: Duration = Duration::from_secs(30);

/// Persisted player record, keyed by `player_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub position: Vec2,
    pub level: u32,
    pub exp: u32,
    pub health: i32,
    pub socket_id: Option<String>,
    pub direction: Direction,
    pub action: PlayerAction,
}

/// Level/exp update written after a kill
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub level: u32,
    pub exp: u32,
}

#[derive(Clone)]
enum Backend {
    Supabase(SupabaseClient),
    Memory(Arc<DashMap<PlayerId, PlayerRecord>>),
}

/// Player store operations
#[derive(Clone)]
pub struct PlayerStore {
    backend: Backend,
}

impl PlayerStore {
    pub fn supabase(client: SupabaseClient) -> Self {
        Self {
            backend: Backend::Supabase(client),
        }
    }

    /// Process-local store; records vanish on restart
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Supabase(_) => "supabase",
            Backend::Memory(_) => "memory",
        }
    }

    /// Check the store is reachable
    pub async fn ping(&self) -> Result<(), SupabaseError> {
        match &self.backend {
            Backend::Supabase(client) => client
                .get::<serde_json::Value>(
                    PLAYERS_TABLE,
                    &[("select", "player_id".to_string()), ("limit", "1".to_string())],
                )
                .await
                .map(|_| ()),
            Backend::Memory(_) => Ok(()),
        }
    }

    /// Retry `ping` with backoff until the store answers, then flip `ready`
    pub async fn wait_until_reachable(&self, ready: watch::Sender<bool>) {
        let mut delay = PROBE_INITIAL_DELAY;
        loop {
            match self.ping().await {
                Ok(()) => {
                    info!(backend = self.backend_name(), "Player store reachable");
                    ready.send_replace(true);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Player store unreachable");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(PROBE_MAX_DELAY);
                }
            }
        }
    }

    /// Get a player record by id
    pub async fn load(&self, player_id: &str) -> Result<Option<PlayerRecord>, SupabaseError> {
        match &self.backend {
            Backend::Supabase(client) => {
                client
                    .get_one(PLAYERS_TABLE, &[eq("player_id", player_id)])
                    .await
            }
            Backend::Memory(map) => Ok(map.get(player_id).map(|r| r.value().clone())),
        }
    }

    /// Insert or replace a full record
    pub async fn save(&self, record: &PlayerRecord) -> Result<(), SupabaseError> {
        match &self.backend {
            Backend::Supabase(client) => client.upsert(PLAYERS_TABLE, record, "player_id").await,
            Backend::Memory(map) => {
                map.insert(record.player_id.clone(), record.clone());
                Ok(())
            }
        }
    }

    /// Update level and exp only. Unknown ids are a no-op.
    pub async fn save_progress(
        &self,
        player_id: &str,
        level: u32,
        exp: u32,
    ) -> Result<(), SupabaseError> {
        match &self.backend {
            Backend::Supabase(client) => {
                client
                    .update(
                        PLAYERS_TABLE,
                        &[eq("player_id", player_id)],
                        &ProgressUpdate { level, exp },
                    )
                    .await
            }
            Backend::Memory(map) => {
                if let Some(mut record) = map.get_mut(player_id) {
                    record.level = level;
                    record.exp = exp;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn record(id: &str) -> PlayerRecord {
        PlayerRecord {
            player_id: id.to_string(),
            position: Vec2::new(10.0, 20.0),
            level: 1,
            exp: 0,
            health: 100,
            socket_id: Some("sock-1".to_string()),
            direction: Direction::Down,
            action: PlayerAction::Idle,
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_records() {
        let store = PlayerStore::in_memory();
        assert_ok!(store.ping().await);
        assert_eq!(store.load("alice").await.unwrap(), None);

        assert_ok!(store.save(&record("alice")).await);
        assert_ok!(store.save_progress("alice", 3, 42).await);

        let loaded = store.load("alice").await.unwrap().unwrap();
        assert_eq!((loaded.level, loaded.exp), (3, 42));
        assert_eq!(loaded.position, Vec2::new(10.0, 20.0));
    }

    #[tokio::test]
    async fn progress_for_unknown_player_is_a_no_op() {
        let store = PlayerStore::in_memory();
        assert_ok!(store.save_progress("nobody", 5, 5).await);
        assert_eq!(store.load("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_reports_ready_immediately() {
        let store = PlayerStore::in_memory();
        let (tx, rx) = watch::channel(false);
        store.wait_until_reachable(tx).await;
        assert!(*rx.borrow());
    }

    #[test]
    fn record_uses_snake_case_columns() {
        let json = serde_json::to_value(record("bob")).unwrap();
        assert_eq!(json["player_id"], "bob");
        assert_eq!(json["socket_id"], "sock-1");
        assert_eq!(json["direction"], "down");
    }
}
