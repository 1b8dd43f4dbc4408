//! Pending player input and its merge rules
//!
//! Socket messages arrive at any rate; the simulation consumes at most one
//! buffered input per player per tick. Merging a new message into the buffer:
//!
//! - directional flags and `direction` are overwritten wholesale, absent
//!   fields reading as `false` / `None`;
//! - `action` is overwritten when the message carries one; otherwise a
//!   buffered `attack` is kept (sticky) and anything else is dropped.
//!
//! The buffer empties when a tick takes it.

use crate::ws::protocol::PlayerInputMsg;

use super::entity::{Direction, PlayerAction};

/// One tick's worth of resolved input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferedInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub direction: Option<Direction>,
    pub action: Option<PlayerAction>,
}

impl BufferedInput {
    /// Horizontal axis in {-1, 0, 1}; opposing flags cancel
    pub fn axis_x(&self) -> f32 {
        (self.right as i8 - self.left as i8) as f32
    }

    /// Vertical axis in {-1, 0, 1}, screen coordinates (down is positive)
    pub fn axis_y(&self) -> f32 {
        (self.down as i8 - self.up as i8) as f32
    }

    pub fn any_axis(&self) -> bool {
        self.left || self.right || self.up || self.down
    }

    pub fn is_attack(&self) -> bool {
        self.action == Some(PlayerAction::Attack)
    }
}

/// Per-player input buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputAccumulator {
    pending: Option<BufferedInput>,
}

impl InputAccumulator {
    /// Fold an incoming message into the buffer
    pub fn merge(&mut self, msg: &PlayerInputMsg) {
        let sticky_attack = self.pending.map_or(false, |p| p.is_attack());

        let action = match msg.action {
            Some(action) => Some(action),
            None if sticky_attack => Some(PlayerAction::Attack),
            None => None,
        };

        self.pending = Some(BufferedInput {
            left: msg.left.unwrap_or(false),
            right: msg.right.unwrap_or(false),
            up: msg.up.unwrap_or(false),
            down: msg.down.unwrap_or(false),
            direction: msg.direction,
            action,
        });
    }

    /// Consume the buffer for this tick
    pub fn take(&mut self) -> Option<BufferedInput> {
        self.pending.take()
    }

    #[cfg(test)]
    pub fn peek(&self) -> Option<&BufferedInput> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}
