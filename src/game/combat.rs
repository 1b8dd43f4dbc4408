//! Combat system - melee attacks, damage, kills and experience

use std::collections::BTreeMap;

use super::ai::AiSystem;
use super::entity::{EnemyEntity, EnemyId, EntityStore, PlayerId, Vec2};

/// Reach of a melee attack
pub const ATTACK_RADIUS: f32 = 50.0;
/// Damage per landed attack
pub const ATTACK_DAMAGE: i32 = 10;
/// Experience granted for a kill
pub const KILL_EXP: u32 = 50;

/// Result of a single attack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    /// No alive enemy in reach (or unknown attacker)
    Miss,
    /// Enemy survived and is now confused
    Hit { enemy_id: EnemyId, remaining_health: i32 },
    /// Enemy died and was removed
    Kill(KillReport),
}

/// Everything the caller needs to notify and persist after a kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillReport {
    pub enemy_id: EnemyId,
    pub player_id: PlayerId,
    pub level: u32,
    pub exp: u32,
    pub levels_gained: u32,
}

/// Combat system for resolving player attacks
pub struct CombatSystem;

impl CombatSystem {
    /// Nearest alive enemy within `radius`; equal distances go to the lowest id
    pub fn nearest_enemy<'a>(
        position: Vec2,
        enemies: &'a BTreeMap<EnemyId, EnemyEntity>,
        radius: f32,
    ) -> Option<&'a EnemyEntity> {
        enemies
            .values()
            .filter(|e| e.alive)
            .map(|e| (position.distance(e.position), e))
            .filter(|(d, _)| *d <= radius)
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)))
            .map(|(_, e)| e)
    }

    /// Resolve one attack by `player_id` against the nearest enemy in reach
    pub fn resolve_attack(player_id: &str, entities: &mut EntityStore) -> AttackOutcome {
        let Some(position) = entities.player(player_id).map(|p| p.position) else {
            return AttackOutcome::Miss;
        };
        let Some(enemy_id) =
            Self::nearest_enemy(position, &entities.enemies, ATTACK_RADIUS).map(|e| e.id.clone())
        else {
            return AttackOutcome::Miss;
        };
        let Some(enemy) = entities.enemies.get_mut(&enemy_id) else {
            return AttackOutcome::Miss;
        };

        if !enemy.apply_damage(ATTACK_DAMAGE) {
            AiSystem::confuse(enemy);
            return AttackOutcome::Hit {
                enemy_id,
                remaining_health: enemy.health,
            };
        }

        entities.remove_enemy(&enemy_id);

        let Some(player) = entities.player_mut(player_id) else {
            return AttackOutcome::Miss;
        };
        let levels_gained = player.gain_exp(KILL_EXP);

        AttackOutcome::Kill(KillReport {
            enemy_id,
            player_id: player.id.clone(),
            level: player.level,
            exp: player.exp,
            levels_gained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EnemyAction, PlayerEntity, ENEMY_START_HEALTH};

    fn world() -> EntityStore {
        let mut store = EntityStore::new();
        let mut player = PlayerEntity::new("p1".to_string());
        player.position = Vec2::new(100.0, 100.0);
        store.insert_player(player);
        store
    }

    fn spawn(store: &mut EntityStore, id: &str, x: f32, y: f32) {
        let mut enemy = EnemyEntity::new(id.to_string(), Vec2::new(x, y));
        AiSystem::start_cycle(&mut enemy);
        store.insert_enemy(enemy);
    }

    #[test]
    fn three_hits_kill_a_fresh_enemy() {
        assert_eq!(ENEMY_START_HEALTH, 30);
        let mut store = world();
        spawn(&mut store, "enemy-1", 120.0, 100.0);

        let first = CombatSystem::resolve_attack("p1", &mut store);
        assert_eq!(
            first,
            AttackOutcome::Hit {
                enemy_id: "enemy-1".to_string(),
                remaining_health: 20
            }
        );
        assert_eq!(store.enemies["enemy-1"].action, EnemyAction::Confused);

        CombatSystem::resolve_attack("p1", &mut store);
        let third = CombatSystem::resolve_attack("p1", &mut store);
        match third {
            AttackOutcome::Kill(report) => {
                assert_eq!(report.enemy_id, "enemy-1");
                assert_eq!(report.exp, 50);
                assert_eq!(report.levels_gained, 0);
            }
            other => panic!("expected kill, got {other:?}"),
        }
        assert!(store.enemies.is_empty());
        assert_eq!(CombatSystem::resolve_attack("p1", &mut store), AttackOutcome::Miss);
    }

    #[test]
    fn second_kill_levels_up() {
        let mut store = world();
        store.player_mut("p1").unwrap().exp = 50;
        spawn(&mut store, "enemy-1", 100.0, 110.0);
        store.enemies.get_mut("enemy-1").unwrap().health = 10;

        let AttackOutcome::Kill(report) = CombatSystem::resolve_attack("p1", &mut store) else {
            panic!("expected kill");
        };
        assert_eq!((report.level, report.exp, report.levels_gained), (2, 0, 1));
    }

    #[test]
    fn attacks_hit_the_nearest_enemy_in_reach() {
        let mut store = world();
        spawn(&mut store, "enemy-a", 140.0, 100.0);
        spawn(&mut store, "enemy-b", 100.0, 80.0);
        spawn(&mut store, "enemy-c", 100.0, 120.0);
        spawn(&mut store, "enemy-d", 160.0, 100.0);

        // b and c tie at 20; b has the lower id
        let outcome = CombatSystem::resolve_attack("p1", &mut store);
        assert!(matches!(outcome, AttackOutcome::Hit { ref enemy_id, .. } if enemy_id == "enemy-b"));
        assert_eq!(store.enemies["enemy-c"].health, 30);
        assert_eq!(store.enemies["enemy-d"].health, 30);
    }

    #[test]
    fn out_of_reach_or_unknown_attacker_misses() {
        let mut store = world();
        spawn(&mut store, "enemy-1", 151.0, 100.0);
        assert_eq!(CombatSystem::resolve_attack("p1", &mut store), AttackOutcome::Miss);
        assert_eq!(CombatSystem::resolve_attack("ghost", &mut store), AttackOutcome::Miss);
        assert_eq!(store.enemies["enemy-1"].health, 30);
    }
}
