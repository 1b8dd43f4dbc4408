//! World state and authoritative tick loop
//!
//! One task owns the [`EntityStore`]. Socket tasks talk to it only through
//! [`WorldCommand`]s, and the task interleaves those with ticks and spawner
//! passes, so no two of them ever touch entity state at the same time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{PlayerRecord, PlayerStore};
use crate::util::time::{tick_delta_ms, tick_duration};
use crate::ws::protocol::{Frame, InitPayload, PlayerInputMsg, PlayerPublic, ServerMsg, Snapshot};

use super::ai::AiSystem;
use super::collision::CollisionIndex;
use super::combat::{AttackOutcome, CombatSystem, KillReport};
use super::entity::{EntityStore, PlayerEntity, PlayerId};
use super::movement::MovementSystem;
use super::snapshot::{SnapshotBuilder, StateBroadcaster};
use super::spawner::EnemySpawner;

/// Commands from socket tasks into the world task
#[derive(Debug)]
pub enum WorldCommand {
    /// Connection sent `init`; `record` is what the store had for the id
    Join {
        conn_id: Uuid,
        player_id: PlayerId,
        record: Option<PlayerRecord>,
        outbox: mpsc::Sender<Frame>,
    },
    Input {
        conn_id: Uuid,
        input: PlayerInputMsg,
    },
    Chat {
        conn_id: Uuid,
        message: String,
    },
    Disconnect {
        conn_id: Uuid,
    },
}

/// Everything a tick produced besides entity state
#[derive(Debug, Default)]
pub struct TickReport {
    pub snapshot: Snapshot,
    pub kills: Vec<KillReport>,
}

/// The synchronous simulation: entity state plus the map it lives on
pub struct Simulation {
    entities: EntityStore,
    collision: Arc<CollisionIndex>,
    tick: u64,
}

impl Simulation {
    pub fn new(collision: Arc<CollisionIndex>) -> Self {
        Self {
            entities: EntityStore::new(),
            collision,
            tick: 0,
        }
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Run a single simulation tick: players, then enemies, then snapshot.
    ///
    /// Players and enemies both advance by the fixed nominal step.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut kills = Vec::new();

        let pending: Vec<PlayerId> = self
            .entities
            .players
            .values()
            .filter(|p| !p.pending_input.is_empty())
            .map(|p| p.id.clone())
            .collect();

        for player_id in pending {
            let Some(player) = self.entities.player_mut(&player_id) else {
                continue;
            };
            let Some(input) = player.pending_input.take() else {
                continue;
            };

            MovementSystem::resolve(player, &input, &self.collision);

            if input.is_attack() {
                if let AttackOutcome::Kill(report) =
                    CombatSystem::resolve_attack(&player_id, &mut self.entities)
                {
                    kills.push(report);
                }
            }
        }

        AiSystem::update(&mut self.entities, &self.collision, tick_delta_ms());

        TickReport {
            snapshot: SnapshotBuilder::build(&self.entities),
            kills,
        }
    }
}

/// Live entity counts, readable without going through the world task
#[derive(Debug, Default)]
pub struct WorldCounts {
    pub players: AtomicUsize,
    pub enemies: AtomicUsize,
}

/// Handle to the running world
#[derive(Clone)]
pub struct WorldHandle {
    pub commands: mpsc::Sender<WorldCommand>,
    pub frames: broadcast::Sender<Frame>,
    pub counts: Arc<WorldCounts>,
}

impl WorldHandle {
    pub fn player_count(&self) -> usize {
        self.counts.players.load(Ordering::Relaxed)
    }

    pub fn enemy_count(&self) -> usize {
        self.counts.enemies.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.frames.subscribe()
    }
}

struct Connection {
    player_id: Option<PlayerId>,
    outbox: mpsc::Sender<Frame>,
}

/// The authoritative world task
pub struct GameWorld {
    sim: Simulation,
    spawner: EnemySpawner,
    spawn_interval: Duration,
    store: PlayerStore,
    store_ready: watch::Receiver<bool>,
    commands: mpsc::Receiver<WorldCommand>,
    broadcaster: StateBroadcaster,
    connections: HashMap<Uuid, Connection>,
    player_conns: HashMap<PlayerId, Uuid>,
    counts: Arc<WorldCounts>,
}

impl GameWorld {
    /// Create a new world
    pub fn new(
        collision: Arc<CollisionIndex>,
        spawner: EnemySpawner,
        spawn_interval: Duration,
        store: PlayerStore,
        store_ready: watch::Receiver<bool>,
    ) -> (Self, WorldHandle) {
        let (command_tx, command_rx) = mpsc::channel(1024);
        let (frame_tx, _) = broadcast::channel(64);
        let counts = Arc::new(WorldCounts::default());

        let handle = WorldHandle {
            commands: command_tx,
            frames: frame_tx.clone(),
            counts: counts.clone(),
        };

        let world = Self {
            sim: Simulation::new(collision),
            spawner,
            spawn_interval,
            store,
            store_ready,
            commands: command_rx,
            broadcaster: StateBroadcaster::new(frame_tx),
            connections: HashMap::new(),
            player_conns: HashMap::new(),
            counts,
        };

        (world, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(
            enemy_cap = self.spawner.cap(),
            tick_ms = tick_delta_ms(),
            "World started"
        );

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut spawn_interval = interval(self.spawn_interval);
        spawn_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => self.run_tick(),
                _ = spawn_interval.tick() => self.run_spawner(),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        info!(ticks = self.sim.tick_count(), "World stopped");
    }

    fn handle_command(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Join {
                conn_id,
                player_id,
                record,
                outbox,
            } => self.handle_join(conn_id, player_id, record, outbox),
            WorldCommand::Input { conn_id, input } => self.handle_input(conn_id, &input),
            WorldCommand::Chat { conn_id, message } => self.handle_chat(conn_id, message),
            WorldCommand::Disconnect { conn_id } => self.handle_disconnect(conn_id),
        }
    }

    /// Handle a connection claiming a player id
    fn handle_join(
        &mut self,
        conn_id: Uuid,
        player_id: PlayerId,
        record: Option<PlayerRecord>,
        outbox: mpsc::Sender<Frame>,
    ) {
        if let Some(existing) = self.connections.get(&conn_id).and_then(|c| c.player_id.clone()) {
            warn!(conn_id = %conn_id, player_id = %existing, "Connection already initialized");
            return;
        }

        // Same player on a new socket: the live entity moves over to it and
        // the old socket loses the player
        let replaced = self.player_conns.insert(player_id.clone(), conn_id);
        if let Some(old_conn) = replaced {
            if let Some(old) = self.connections.get_mut(&old_conn) {
                old.player_id = None;
                send_to(
                    &old.outbox,
                    &ServerMsg::Error {
                        code: "session_replaced".to_string(),
                        message: "Player joined from another connection".to_string(),
                    },
                );
            }
            info!(player_id = %player_id, old_conn = %old_conn, "Player session replaced");
        }

        let is_new = replaced.is_none() && record.is_none();
        if self.sim.entities().player(&player_id).is_none() {
            let player = match &record {
                Some(record) => PlayerEntity::from_record(record),
                None => PlayerEntity::new(player_id.clone()),
            };
            self.sim.entities_mut().insert_player(player);
        }
        let Some((player_data, saved)) = self
            .sim
            .entities()
            .player(&player_id)
            .map(|p| (PlayerPublic::from(p), p.to_record(Some(conn_id.to_string()))))
        else {
            return;
        };
        self.persist_record(saved);

        self.connections.insert(
            conn_id,
            Connection {
                player_id: Some(player_id.clone()),
                outbox,
            },
        );
        self.update_counts();

        let snapshot = SnapshotBuilder::build(self.sim.entities());
        if let Some(conn) = self.connections.get(&conn_id) {
            send_to(
                &conn.outbox,
                &ServerMsg::Init(InitPayload {
                    player_data: player_data.clone(),
                    players: snapshot.players,
                    enemies: snapshot.enemies,
                }),
            );
        }
        if replaced.is_none() {
            self.broadcaster
                .publish(&ServerMsg::PlayerJoined { player_data });
        }

        info!(
            player_id = %player_id,
            conn_id = %conn_id,
            new_player = is_new,
            player_count = self.sim.entities().players.len(),
            "Player joined world"
        );
    }

    /// Buffer input; the next tick consumes it
    fn handle_input(&mut self, conn_id: Uuid, input: &PlayerInputMsg) {
        let Some(player_id) = self.player_for(conn_id) else {
            debug!(conn_id = %conn_id, "Input from uninitialized connection");
            return;
        };
        if let Some(player) = self.sim.entities_mut().player_mut(&player_id) {
            player.pending_input.merge(input);
        }
    }

    fn handle_chat(&mut self, conn_id: Uuid, message: String) {
        let Some(player_id) = self.player_for(conn_id) else {
            return;
        };
        self.broadcaster.publish(&ServerMsg::ChatMessage {
            id: player_id,
            message,
        });
    }

    /// Remove the player and its connection mapping together
    fn handle_disconnect(&mut self, conn_id: Uuid) {
        let Some(conn) = self.connections.remove(&conn_id) else {
            return;
        };
        let Some(player_id) = conn.player_id else {
            debug!(conn_id = %conn_id, "Uninitialized connection closed");
            return;
        };

        self.player_conns.remove(&player_id);
        if let Some(player) = self.sim.entities_mut().remove_player(&player_id) {
            self.persist_record(player.to_record(None));
        }
        self.update_counts();

        self.broadcaster.publish(&ServerMsg::PlayerLeft {
            player_id: player_id.clone(),
        });

        info!(player_id = %player_id, conn_id = %conn_id, "Player left world");
    }

    fn run_tick(&mut self) {
        let report = self.sim.tick();

        for kill in &report.kills {
            debug!(
                player_id = %kill.player_id,
                enemy_id = %kill.enemy_id,
                level = kill.level,
                exp = kill.exp,
                "Enemy killed"
            );
            self.persist_progress(kill);
            if kill.levels_gained > 0 {
                info!(player_id = %kill.player_id, level = kill.level, "Player levelled up");
                self.send_to_player(&kill.player_id, &ServerMsg::LevelUp { level: kill.level });
            }
        }

        self.broadcaster.publish_snapshot(report.snapshot);
        if !report.kills.is_empty() {
            self.update_counts();
        }
    }

    /// Spawning waits until the store has answered at least once
    fn run_spawner(&mut self) {
        if !*self.store_ready.borrow() {
            debug!("Player store not reachable yet, withholding enemy spawns");
            return;
        }
        let sim = &mut self.sim;
        if self
            .spawner
            .replenish(&mut sim.entities, &sim.collision)
            .is_some()
        {
            self.update_counts();
        }
    }

    fn player_for(&self, conn_id: Uuid) -> Option<PlayerId> {
        self.connections.get(&conn_id)?.player_id.clone()
    }

    fn send_to_player(&self, player_id: &str, msg: &ServerMsg) {
        let conn = self
            .player_conns
            .get(player_id)
            .and_then(|conn_id| self.connections.get(conn_id));
        if let Some(conn) = conn {
            send_to(&conn.outbox, msg);
        }
    }

    fn update_counts(&self) {
        let entities = self.sim.entities();
        self.counts
            .players
            .store(entities.players.len(), Ordering::Relaxed);
        self.counts
            .enemies
            .store(entities.alive_enemy_count(), Ordering::Relaxed);
    }

    /// Fire-and-forget level/exp write. Completion order relative to later
    /// writes for the same player is not guaranteed.
    fn persist_progress(&self, kill: &KillReport) {
        let store = self.store.clone();
        let player_id = kill.player_id.clone();
        let (level, exp) = (kill.level, kill.exp);
        tokio::spawn(async move {
            if let Err(e) = store.save_progress(&player_id, level, exp).await {
                warn!(player_id = %player_id, error = %e, "Failed to persist player progress");
            }
        });
    }

    fn persist_record(&self, record: PlayerRecord) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save(&record).await {
                warn!(player_id = %record.player_id, error = %e, "Failed to persist player record");
            }
        });
    }
}

/// Queue a message on one connection without waiting
fn send_to(outbox: &mpsc::Sender<Frame>, msg: &ServerMsg) {
    let frame = match msg.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to encode message");
            return;
        }
    };
    match outbox.try_send(frame) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => warn!("Connection outbox full, dropping message"),
        Err(mpsc::error::TrySendError::Closed(_)) => debug!("Connection outbox closed"),
    }
}
