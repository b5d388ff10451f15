//! Match Configuration
//!
//! Every gameplay tunable in one place. The defaults are the live values.

use std::time::Duration;

use crate::core::vec2::Vec2;

/// Tunable constants for the simulation, spawners and player lifecycle.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Simulation rate (Hz).
    pub tick_rate: u32,
    /// Radius used for bullet hits and pickups.
    pub hit_radius: f64,
    /// Per-player radius for pairwise separation.
    pub separation_radius: f64,
    /// Multiplier applied to the separation overlap.
    pub push_force: f64,
    /// Velocity added to a victim along the bullet direction.
    pub knockback_impulse: f64,
    /// Per-tick velocity multiplier.
    pub velocity_damping: f64,
    /// Speeds below this are snapped to zero.
    pub velocity_rest_threshold: f64,
    /// Maximum world weapons.
    pub weapon_cap: usize,
    /// Weapon spawner period.
    pub weapon_spawn_interval: Duration,
    /// Maximum world power-ups.
    pub powerup_cap: usize,
    /// Shortest power-up spawner delay (seconds).
    pub powerup_interval_min_secs: u32,
    /// Longest power-up spawner delay (seconds).
    pub powerup_interval_max_secs: u32,
    /// Age at which a world weapon or power-up despawns.
    pub despawn_after: Duration,
    /// Time between death and respawn.
    pub respawn_delay: Duration,
    /// Time a disconnected player is kept for reconnection.
    pub grace_window: Duration,
    /// Width of the spawn area.
    pub world_width: f64,
    /// Height of the spawn area.
    pub world_height: f64,
    /// Position used for new players and for resetting invalid positions.
    pub default_spawn: Vec2,
    /// Teleport displacement.
    pub teleport_distance: f64,
    /// Health regenerated per second while regen is active.
    pub regen_per_second: f64,
    /// Length of a health-regen effect.
    pub regen_duration: Duration,
    /// Offset of a weapon dropped on pickup, relative to the player.
    pub weapon_drop_offset: Vec2,
    /// Respawn candidates.
    pub spawn_points: Vec<Vec2>,
    /// Minimum distance from any living player for a respawn point.
    pub safe_spawn_distance: f64,
    /// Sampling attempts before falling back to the least contested point.
    pub spawn_attempts: u32,
    /// Whether the match runs as soon as the server starts.
    pub start_active: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            hit_radius: 20.0,
            separation_radius: 15.0,
            push_force: 1.5,
            knockback_impulse: 100.0,
            velocity_damping: 0.9,
            velocity_rest_threshold: 0.01,
            weapon_cap: 5,
            weapon_spawn_interval: Duration::from_secs(1),
            powerup_cap: 3,
            powerup_interval_min_secs: 15,
            powerup_interval_max_secs: 45,
            despawn_after: Duration::from_secs(30),
            respawn_delay: Duration::from_secs(3),
            grace_window: Duration::from_secs(5),
            world_width: 1000.0,
            world_height: 600.0,
            default_spawn: Vec2::new(500.0, 300.0),
            teleport_distance: 100.0,
            regen_per_second: 10.0,
            regen_duration: Duration::from_secs(10),
            weapon_drop_offset: Vec2::new(30.0, 0.0),
            spawn_points: vec![
                Vec2::new(100.0, 100.0),
                Vec2::new(800.0, 500.0),
                Vec2::new(400.0, 300.0),
            ],
            safe_spawn_distance: 100.0,
            spawn_attempts: 32,
            start_active: true,
        }
    }
}

impl MatchConfig {
    /// Length of one tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }

    /// Length of one tick in seconds.
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.tick_rate.max(1) as f64
    }
}
