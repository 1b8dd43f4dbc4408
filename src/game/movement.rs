//! Player movement against the tile collision grid

use crate::util::time::TICK_RATE;

use super::collision::CollisionIndex;
use super::entity::{PlayerAction, PlayerEntity, Vec2};
use super::input::BufferedInput;

/// Collision probe offset from the player's position, x axis.
///
/// The probe sits at the sprite's feet: slightly left of the anchor and half a
/// sprite down. Both axes are tested together through this single point.
pub const PROBE_OFFSET_X: f32 = -2.0;
/// Collision probe offset, y axis (half of a 32px sprite)
pub const PROBE_OFFSET_Y: f32 = 16.0;

/// Result of resolving one buffered input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// No axis was active
    Stationary,
    Moved,
    /// The probe landed on a blocked tile; position unchanged
    Blocked,
}

/// Movement system for applying buffered input to players
pub struct MovementSystem;

impl MovementSystem {
    /// Probe point for a candidate position
    pub fn probe_point(position: Vec2) -> Vec2 {
        Vec2::new(position.x + PROBE_OFFSET_X, position.y + PROBE_OFFSET_Y)
    }

    /// Displacement for one tick. Axes combine additively, so diagonals are
    /// not normalized.
    pub fn displacement(speed: f32, input: &BufferedInput) -> Vec2 {
        let step = speed / TICK_RATE as f32;
        Vec2::new(input.axis_x() * step, input.axis_y() * step)
    }

    /// Apply one buffered input to a player
    pub fn resolve(
        player: &mut PlayerEntity,
        input: &BufferedInput,
        collision: &CollisionIndex,
    ) -> MoveOutcome {
        if let Some(direction) = input.direction {
            player.direction = direction;
        }
        player.action = input.action.unwrap_or(if input.any_axis() {
            PlayerAction::Walk
        } else {
            PlayerAction::Idle
        });

        let delta = Self::displacement(player.speed, input);
        if delta == Vec2::ZERO {
            return MoveOutcome::Stationary;
        }

        let candidate = Vec2::new(player.position.x + delta.x, player.position.y + delta.y);
        if collision.is_blocked_at(Self::probe_point(candidate)) {
            return MoveOutcome::Blocked;
        }

        player.position = candidate;
        MoveOutcome::Moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::Direction;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn open_map() -> CollisionIndex {
        CollisionIndex::from_blocked(40, 30, 16.0, 16.0, [])
    }

    fn player_at(x: f32, y: f32) -> PlayerEntity {
        let mut player = PlayerEntity::new("p1".to_string());
        player.position = Vec2::new(x, y);
        player
    }

    #[test]
    fn one_tick_right_moves_three_units() {
        let mut player = player_at(300.0, 200.0);
        let input = BufferedInput {
            right: true,
            ..BufferedInput::default()
        };

        let outcome = MovementSystem::resolve(&mut player, &input, &open_map());
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(player.position, Vec2::new(303.0, 200.0));
        assert_eq!(player.action, PlayerAction::Walk);
    }

    #[test]
    fn blocked_probe_rejects_both_axes() {
        // Moving right+down from (300, 200) puts the probe at (301, 219) -> tile (18, 13)
        let map = CollisionIndex::from_blocked(40, 30, 16.0, 16.0, [(18, 13)]);
        let mut player = player_at(300.0, 200.0);
        let input = BufferedInput {
            right: true,
            down: true,
            direction: Some(Direction::Right),
            ..BufferedInput::default()
        };

        let outcome = MovementSystem::resolve(&mut player, &input, &map);
        assert_eq!(outcome, MoveOutcome::Blocked);
        assert_eq!(player.position, Vec2::new(300.0, 200.0));
        // Facing still follows the input
        assert_eq!(player.direction, Direction::Right);
    }

    #[test]
    fn facing_comes_from_input_not_motion() {
        let mut player = player_at(300.0, 200.0);
        let input = BufferedInput {
            left: true,
            direction: Some(Direction::Up),
            ..BufferedInput::default()
        };
        MovementSystem::resolve(&mut player, &input, &open_map());
        assert_eq!(player.direction, Direction::Up);
        assert_eq!(player.position, Vec2::new(297.0, 200.0));
    }

    #[test]
    fn missing_direction_keeps_previous_facing() {
        let mut player = player_at(300.0, 200.0);
        player.direction = Direction::Left;
        MovementSystem::resolve(&mut player, &BufferedInput::default(), &open_map());
        assert_eq!(player.direction, Direction::Left);
        assert_eq!(player.action, PlayerAction::Idle);
    }

    #[test]
    fn attack_action_is_copied() {
        let mut player = player_at(300.0, 200.0);
        let input = BufferedInput {
            up: true,
            action: Some(PlayerAction::Attack),
            ..BufferedInput::default()
        };
        MovementSystem::resolve(&mut player, &input, &open_map());
        assert_eq!(player.action, PlayerAction::Attack);
        assert_eq!(player.position, Vec2::new(300.0, 197.0));
    }

    #[test]
    fn random_walks_never_end_on_a_blocked_tile() {
        let blocked: Vec<(i32, i32)> = (0..12).map(|i| (i + 3, 7)).chain((3..9).map(|j| (10, j))).collect();
        let map = CollisionIndex::from_blocked(16, 12, 16.0, 16.0, blocked);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..20 {
            let mut player = player_at(40.0, 40.0);
            assert!(!map.is_blocked_at(MovementSystem::probe_point(player.position)));

            for _ in 0..500 {
                let input = BufferedInput {
                    left: rng.gen(),
                    right: rng.gen(),
                    up: rng.gen(),
                    down: rng.gen(),
                    ..BufferedInput::default()
                };
                MovementSystem::resolve(&mut player, &input, &map);

                let (tx, ty) = map.tile_of(MovementSystem::probe_point(player.position));
                let (w, h) = map.dimensions();
                assert!(tx >= 0 && ty >= 0 && tx < w && ty < h);
                assert!(!map.is_blocked(tx, ty));
            }
        }
    }
}
