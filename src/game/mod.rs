//! Game Logic Module
//!
//! Everything that reads or mutates gameplay state. All of it runs with the
//! world lock held; nothing in here performs I/O.
//!
//! ## Module Structure
//!
//! - `world`: The shared entity store and broadcast helpers
//! - `entity`: Players, bullets, pickups and their identifiers
//! - `weapon`: Weapon table and shot patterns
//! - `command`: Move, shoot and teleport commands
//! - `tick`: Authoritative simulation step
//! - `collision`: Radius checks and player separation
//! - `lifecycle`: Death, respawn and removal
//! - `spawner`: Weapon and power-up spawning
//! - `config`: Gameplay tunables

pub mod collision;
pub mod command;
pub mod config;
pub mod entity;
pub mod lifecycle;
pub mod spawner;
pub mod tick;
pub mod weapon;
pub mod world;

// Re-export key types
pub use command::{apply_command, Command, CommandOutcome};
pub use config::MatchConfig;
pub use entity::{EntityId, Player, PlayerId, PowerUpType};
pub use tick::{tick, Hit, TickResult};
pub use weapon::WeaponType;
pub use world::{SharedWorld, World};
