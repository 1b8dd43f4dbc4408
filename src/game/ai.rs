//! Enemy behaviour: target acquisition and the hop/idle/long-jump cycle
//!
//! Without interference every enemy loops through [`BEHAVIOR_CYCLE`]. Jumps
//! head toward the current target; with no target they play in place. Damage
//! interrupts the cycle with `confused`, which resumes at the next cycle slot
//! once its pause runs out. The cycle index is left as it was.

use std::collections::BTreeMap;

use tracing::debug;

use super::collision::CollisionIndex;
use super::entity::{Direction, EnemyAction, EnemyEntity, EntityStore, PlayerEntity, PlayerId, Vec2};

/// Fixed behaviour schedule followed by every enemy
pub const BEHAVIOR_CYCLE: [EnemyAction; 5] = [
    EnemyAction::Hop,
    EnemyAction::Idle,
    EnemyAction::LongJump,
    EnemyAction::Idle,
    EnemyAction::Idle,
];

/// Duration of idle and confused states, milliseconds
pub const PAUSE_DURATION_MS: f32 = 1000.0;

/// Range within which an enemy notices players
pub const DETECTION_RADIUS: f32 = 50.0;

/// Distance and duration of a jump action
#[derive(Debug, Clone, Copy)]
pub struct JumpProfile {
    pub distance: f32,
    pub duration_ms: f32,
}

impl JumpProfile {
    /// Travel speed in world units per second
    pub fn speed(&self) -> f32 {
        self.distance / (self.duration_ms / 1000.0)
    }
}

pub const HOP: JumpProfile = JumpProfile {
    distance: 10.0,
    duration_ms: 1000.0,
};

pub const LONG_JUMP: JumpProfile = JumpProfile {
    distance: 60.0,
    duration_ms: 600.0,
};

/// AI system for advancing enemies
pub struct AiSystem;

impl AiSystem {
    /// Run targeting then stepping for every alive enemy
    pub fn update(entities: &mut EntityStore, collision: &CollisionIndex, dt_ms: f32) {
        let players = &entities.players;
        for enemy in entities.enemies.values_mut().filter(|e| e.alive) {
            Self::acquire_target(enemy, players);
            Self::step(enemy, players, collision, dt_ms);
        }
    }

    /// Put a freshly spawned enemy at the start of its cycle
    pub fn start_cycle(enemy: &mut EnemyEntity) {
        enemy.behavior_cycle_index = 0;
        Self::enter_action(enemy, BEHAVIOR_CYCLE[0], None);
    }

    /// Nearest alive player within `radius`; equal distances go to the lowest id
    pub fn nearest_player<'a>(
        position: Vec2,
        players: &'a BTreeMap<PlayerId, PlayerEntity>,
        radius: f32,
    ) -> Option<&'a PlayerEntity> {
        players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| (position.distance(p.position), p))
            .filter(|(d, _)| *d <= radius)
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)))
            .map(|(_, p)| p)
    }

    /// Drop a target that died, left or moved out of range, then look for a
    /// new one if the enemy has none.
    pub fn acquire_target(enemy: &mut EnemyEntity, players: &BTreeMap<PlayerId, PlayerEntity>) {
        if let Some(target_id) = &enemy.target_player_id {
            let in_range = players
                .get(target_id)
                .filter(|p| p.is_alive())
                .map_or(false, |p| enemy.position.distance(p.position) <= DETECTION_RADIUS);
            if in_range {
                return;
            }

            debug!(enemy_id = %enemy.id, player_id = %target_id, "Enemy lost target");
            enemy.target_player_id = None;
            Self::enter_action(enemy, EnemyAction::Idle, None);
        }

        if let Some(player) = Self::nearest_player(enemy.position, players, DETECTION_RADIUS) {
            debug!(enemy_id = %enemy.id, player_id = %player.id, "Enemy acquired target");
            enemy.target_player_id = Some(player.id.clone());
            enemy.behavior_cycle_index = 0;
            Self::enter_action(enemy, BEHAVIOR_CYCLE[0], Some(player.position));
        }
    }

    /// Advance the action timer and integrate velocity
    pub fn step(
        enemy: &mut EnemyEntity,
        players: &BTreeMap<PlayerId, PlayerEntity>,
        collision: &CollisionIndex,
        dt_ms: f32,
    ) {
        enemy.action_timer -= dt_ms;
        if enemy.action_timer <= 0.0 {
            enemy.behavior_cycle_index = (enemy.behavior_cycle_index + 1) % BEHAVIOR_CYCLE.len();
            let target = enemy
                .target_player_id
                .as_ref()
                .and_then(|id| players.get(id))
                .map(|p| p.position);
            Self::enter_action(enemy, BEHAVIOR_CYCLE[enemy.behavior_cycle_index], target);
        }

        if enemy.velocity == Vec2::ZERO {
            return;
        }
        let dt = dt_ms / 1000.0;
        let candidate = Vec2::new(
            enemy.position.x + enemy.velocity.x * dt,
            enemy.position.y + enemy.velocity.y * dt,
        );
        if !collision.is_blocked_at(candidate) {
            enemy.position = candidate;
        }
    }

    /// Interrupt the cycle after taking a hit
    pub fn confuse(enemy: &mut EnemyEntity) {
        Self::enter_action(enemy, EnemyAction::Confused, None);
    }

    /// Enter `action`, resetting velocity and timer for it
    pub fn enter_action(enemy: &mut EnemyEntity, action: EnemyAction, target: Option<Vec2>) {
        enemy.action = action;
        match action {
            EnemyAction::Hop => Self::jump(enemy, HOP, target),
            EnemyAction::LongJump => Self::jump(enemy, LONG_JUMP, target),
            EnemyAction::Idle | EnemyAction::Confused => {
                enemy.velocity = Vec2::ZERO;
                enemy.action_timer = PAUSE_DURATION_MS;
            }
            EnemyAction::Dying => {
                enemy.velocity = Vec2::ZERO;
                enemy.action_timer = 0.0;
            }
        }
    }

    fn jump(enemy: &mut EnemyEntity, profile: JumpProfile, target: Option<Vec2>) {
        enemy.action_timer = profile.duration_ms;
        let Some(target) = target else {
            enemy.velocity = Vec2::ZERO;
            return;
        };

        let dx = target.x - enemy.position.x;
        let dy = target.y - enemy.position.y;
        let angle = dy.atan2(dx);
        let speed = profile.speed();
        enemy.velocity = Vec2::new(angle.cos() * speed, angle.sin() * speed);
        enemy.direction = facing(dx, dy);
    }
}

/// Animation facing for a displacement; the dominant axis wins
fn facing(dx: f32, dy: f32) -> Direction {
    if dx.abs() > dy.abs() {
        if dx > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if dy > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}
