//! Time utilities for the simulation clock

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const TICK_RATE: u32 = 20; // 20 ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / TICK_RATE as u64;

/// Fixed simulation step in milliseconds.
///
/// Both player speed scaling and enemy integration use this value, never the
/// measured wall-clock delta.
pub fn tick_delta_ms() -> f32 {
    1000.0 / TICK_RATE as f32
}

pub fn tick_duration() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_matches_interval() {
        assert_eq!(tick_delta_ms(), 50.0);
        assert_eq!(tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn uptime_starts_after_init() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }
}
