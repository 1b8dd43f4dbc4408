//! Snapshot building and broadcast

use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::ws::protocol::{EnemyPublic, Frame, PlayerPublic, ServerMsg, Snapshot};

use super::entity::EntityStore;

/// Builds full snapshots of the entity store. No delta compression and no
/// per-client filtering: every client gets the same frame.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(entities: &EntityStore) -> Snapshot {
        Snapshot {
            players: entities
                .players
                .values()
                .map(|p| (p.id.clone(), PlayerPublic::from(p)))
                .collect(),
            enemies: entities
                .enemies
                .values()
                .filter(|e| e.alive)
                .map(|e| (e.id.clone(), EnemyPublic::from(e)))
                .collect(),
        }
    }
}

/// Delivers snapshots and world events to every connected socket.
///
/// Frames are encoded once and shared. A receiver that falls behind skips
/// frames; nothing here throttles or drops it.
pub struct StateBroadcaster {
    tx: broadcast::Sender<Frame>,
    stats: SnapshotStats,
}

impl StateBroadcaster {
    pub fn new(tx: broadcast::Sender<Frame>) -> Self {
        Self {
            tx,
            stats: SnapshotStats::default(),
        }
    }

    /// Encode and send a world snapshot
    pub fn publish_snapshot(&mut self, snapshot: Snapshot) {
        let player_count = snapshot.players.len();
        if let Some(bytes) = self.publish(&ServerMsg::GameState(snapshot)) {
            self.stats.record(player_count, bytes);
            if self.stats.total_snapshots % 200 == 0 {
                debug!(
                    snapshots = self.stats.total_snapshots,
                    total_bytes = self.stats.total_bytes,
                    avg_players = self.stats.avg_players_per_snapshot,
                    "Snapshot stats"
                );
            }
        }
    }

    /// Encode and send any message to every socket. Returns the frame size.
    pub fn publish(&self, msg: &ServerMsg) -> Option<usize> {
        match msg.encode() {
            Ok(frame) => {
                let bytes = frame.len();
                // No receivers just means nobody is connected
                let _ = self.tx.send(frame);
                Some(bytes)
            }
            Err(e) => {
                error!(error = %e, "Failed to encode broadcast message");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_players_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, player_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_players_per_snapshot =
            self.avg_players_per_snapshot * ((n - 1.0) / n) + (player_count as f32 / n);
    }
}
