//! Entity state and the store that owns it

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::PlayerRecord;

use super::input::InputAccumulator;

/// Player walk speed in world units per second
pub const PLAYER_SPEED: f32 = 60.0;
/// Health a freshly created player starts with
pub const PLAYER_START_HEALTH: i32 = 100;
/// Health a freshly spawned enemy starts with
pub const ENEMY_START_HEALTH: i32 = 30;
/// Spawn point for players with no persisted record
pub const DEFAULT_SPAWN: Vec2 = Vec2 { x: 300.0, y: 200.0 };

pub type PlayerId = String;
pub type EnemyId = String;

/// 2D world-space vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Facing direction, used by clients to pick animations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerAction {
    #[default]
    Idle,
    Walk,
    Attack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnemyAction {
    #[default]
    Idle,
    Hop,
    LongJump,
    Confused,
    Dying,
}

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: PlayerId,
    pub position: Vec2,
    pub level: u32,
    pub exp: u32,
    pub health: i32,
    pub direction: Direction,
    pub action: PlayerAction,
    pub pending_input: InputAccumulator,
    pub speed: f32,
}

impl PlayerEntity {
    /// Create a player with default stats at the default spawn point
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            position: DEFAULT_SPAWN,
            level: 1,
            exp: 0,
            health: PLAYER_START_HEALTH,
            direction: Direction::Down,
            action: PlayerAction::Idle,
            pending_input: InputAccumulator::default(),
            speed: PLAYER_SPEED,
        }
    }

    /// Restore a player from its persisted record. Exp past the level
    /// threshold is rolled into levels.
    pub fn from_record(record: &PlayerRecord) -> Self {
        let mut player = Self {
            id: record.player_id.clone(),
            position: record.position,
            level: record.level.max(1),
            exp: record.exp,
            health: record.health,
            direction: record.direction,
            action: PlayerAction::Idle,
            pending_input: InputAccumulator::default(),
            speed: PLAYER_SPEED,
        };
        player.gain_exp(0);
        player
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Experience needed to leave the current level
    pub fn exp_to_next_level(&self) -> u32 {
        self.level * 100
    }

    /// Add experience, rolling over as many levels as the gain covers.
    /// Returns the number of levels gained.
    pub fn gain_exp(&mut self, amount: u32) -> u32 {
        let start_level = self.level;
        self.exp += amount;
        while self.exp >= self.exp_to_next_level() {
            self.exp -= self.exp_to_next_level();
            self.level += 1;
        }
        self.level - start_level
    }

    pub fn to_record(&self, socket_id: Option<String>) -> PlayerRecord {
        PlayerRecord {
            player_id: self.id.clone(),
            position: self.position,
            level: self.level,
            exp: self.exp,
            health: self.health,
            socket_id,
            direction: self.direction,
            action: self.action,
        }
    }
}

/// Enemy state (authoritative)
#[derive(Debug, Clone)]
pub struct EnemyEntity {
    pub id: EnemyId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: i32,
    pub alive: bool,
    pub direction: Direction,
    pub action: EnemyAction,
    pub behavior_cycle_index: usize,
    /// Remaining time in the current action, milliseconds
    pub action_timer: f32,
    pub target_player_id: Option<PlayerId>,
}

impl EnemyEntity {
    pub fn new(id: EnemyId, position: Vec2) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            health: ENEMY_START_HEALTH,
            alive: true,
            direction: Direction::Down,
            action: EnemyAction::Idle,
            behavior_cycle_index: 0,
            action_timer: 0.0,
            target_player_id: None,
        }
    }

    /// Subtract damage, clamping at zero. Returns true if this killed the enemy.
    pub fn apply_damage(&mut self, damage: i32) -> bool {
        self.health = (self.health - damage).max(0);
        if self.health <= 0 {
            self.alive = false;
            self.action = EnemyAction::Dying;
            self.velocity = Vec2::ZERO;
            self.target_player_id = None;
        }
        !self.alive
    }
}

/// Sole owner of mutable simulation state.
///
/// Ordered maps keep per-tick iteration and distance tie-breaks independent of
/// hashing.
#[derive(Debug, Default)]
pub struct EntityStore {
    pub players: BTreeMap<PlayerId, PlayerEntity>,
    pub enemies: BTreeMap<EnemyId, EnemyEntity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_player(&mut self, player: PlayerEntity) {
        self.players.insert(player.id.clone(), player);
    }

    pub fn remove_player(&mut self, id: &str) -> Option<PlayerEntity> {
        self.players.remove(id)
    }

    pub fn player(&self, id: &str) -> Option<&PlayerEntity> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut PlayerEntity> {
        self.players.get_mut(id)
    }

    pub fn insert_enemy(&mut self, enemy: EnemyEntity) {
        self.enemies.insert(enemy.id.clone(), enemy);
    }

    pub fn remove_enemy(&mut self, id: &str) -> Option<EnemyEntity> {
        self.enemies.remove(id)
    }

    pub fn alive_enemy_count(&self) -> usize {
        self.enemies.values().filter(|e| e.alive).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_gain_crosses_several_levels() {
        let mut player = PlayerEntity::new("p1".to_string());
        // 100 for level 1, 200 for level 2, 50 left over at level 3
        let gained = player.gain_exp(350);
        assert_eq!(gained, 2);
        assert_eq!(player.level, 3);
        assert_eq!(player.exp, 50);
    }

    #[test]
    fn exp_stays_below_threshold_for_any_gain_sequence() {
        let mut player = PlayerEntity::new("p1".to_string());
        for amount in [0, 1, 50, 99, 100, 250, 1000, 7, 4999, 50, 50, 50] {
            player.gain_exp(amount);
            assert!(player.level >= 1);
            assert!(player.exp < player.level * 100, "exp {} level {}", player.exp, player.level);
        }
    }

    #[test]
    fn exact_threshold_levels_up_with_zero_exp() {
        let mut player = PlayerEntity::new("p1".to_string());
        player.gain_exp(50);
        assert_eq!(player.gain_exp(50), 1);
        assert_eq!((player.level, player.exp), (2, 0));
    }

    #[test]
    fn damage_never_reports_negative_health() {
        let mut enemy = EnemyEntity::new("enemy-1".to_string(), Vec2::ZERO);
        assert!(!enemy.apply_damage(25));
        assert!(enemy.apply_damage(25));
        assert_eq!(enemy.health, 0);
        assert!(!enemy.alive);
        assert_eq!(enemy.action, EnemyAction::Dying);
    }

    #[test]
    fn record_restore_clamps_level() {
        let mut record = PlayerEntity::new("p1".to_string()).to_record(None);
        record.level = 0;
        record.exp = 40;
        let player = PlayerEntity::from_record(&record);
        assert_eq!(player.level, 1);
        assert_eq!(player.exp, 40);
        assert_eq!(player.speed, PLAYER_SPEED);
    }

    #[test]
    fn record_restore_rolls_excess_exp_into_levels() {
        let mut record = PlayerEntity::new("p1".to_string()).to_record(None);
        record.level = 2;
        record.exp = 550;
        let player = PlayerEntity::from_record(&record);
        // 200 for level 2, 300 for level 3, 50 left over at level 4
        assert_eq!((player.level, player.exp), (4, 50));
        assert!(player.exp < player.exp_to_next_level());
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(Vec2::new(0.0, 0.0).distance(Vec2::new(3.0, 4.0)), 5.0);
    }
}
