//! Enemy spawner - keeps the population topped up to its cap

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::ai::{AiSystem, DETECTION_RADIUS};
use super::collision::CollisionIndex;
use super::entity::{EnemyEntity, EnemyId, EntityStore, Vec2};

/// Random tiles tried per spawn before giving up for this pass
const PLACEMENT_ATTEMPTS: usize = 32;

pub struct EnemySpawner {
    rng: ChaCha8Rng,
    cap: usize,
    next_id: u64,
}

impl EnemySpawner {
    pub fn new(cap: usize, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            cap,
            next_id: 1,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Spawn at most one enemy if the population is under the cap
    pub fn replenish(
        &mut self,
        entities: &mut EntityStore,
        collision: &CollisionIndex,
    ) -> Option<EnemyId> {
        if entities.alive_enemy_count() >= self.cap {
            return None;
        }

        let Some(position) = self.pick_position(entities, collision) else {
            debug!("No free tile found for enemy spawn");
            return None;
        };

        let id = format!("enemy-{}", self.next_id);
        self.next_id += 1;

        let mut enemy = EnemyEntity::new(id.clone(), position);
        AiSystem::start_cycle(&mut enemy);
        entities.insert_enemy(enemy);

        info!(enemy_id = %id, x = position.x, y = position.y, "Enemy spawned");
        Some(id)
    }

    /// A free tile centre out of sight of every player
    fn pick_position(&mut self, entities: &EntityStore, collision: &CollisionIndex) -> Option<Vec2> {
        let (width, height) = collision.dimensions();
        if width <= 0 || height <= 0 {
            return None;
        }

        for _ in 0..PLACEMENT_ATTEMPTS {
            let tx = self.rng.gen_range(0..width);
            let ty = self.rng.gen_range(0..height);
            if collision.is_blocked(tx, ty) {
                continue;
            }
            let candidate = collision.tile_center(tx, ty);
            let near_player = entities
                .players
                .values()
                .any(|p| p.position.distance(candidate) <= DETECTION_RADIUS);
            if !near_player {
                return Some(candidate);
            }
        }
        None
    }
}
