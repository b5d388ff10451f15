//! Pickup Spawning
//!
//! One spawn attempt per call. The server runs these from two timers:
//! weapons on a fixed period, power-ups after a random delay.

use std::time::{Duration, Instant};
use tracing::info;

use crate::game::entity::{EntityId, PowerUp, PowerUpType, WorldWeapon};
use crate::game::weapon::SPAWNABLE_WEAPONS;
use crate::game::world::World;
use crate::network::protocol::{Position, ServerMessage};

/// Spawn one random weapon if the match is running and below the cap.
pub fn spawn_weapon(world: &mut World, now: Instant) -> Option<EntityId> {
    if !world.match_active || world.weapons.len() >= world.config.weapon_cap {
        return None;
    }

    let weapon_type = *world.rng.choose(&SPAWNABLE_WEAPONS)?;
    let position = world
        .rng
        .random_position(world.config.world_width, world.config.world_height);
    let weapon = WorldWeapon {
        id: EntityId::generate(),
        weapon_type,
        position,
        spawned_at: now,
    };
    let id = weapon.id.clone();

    info!(weapon = weapon_type.as_str(), x = position.x, y = position.y, "Weapon spawned");
    world.broadcast(&ServerMessage::WeaponSpawn {
        weapon_id: id.clone(),
        position: Position::at(position),
        weapon: weapon_type,
    });
    world.weapons.insert(id.clone(), weapon);
    Some(id)
}

/// Spawn one random power-up if the match is running and below the cap.
pub fn spawn_powerup(world: &mut World, now: Instant) -> Option<EntityId> {
    if !world.match_active || world.powerups.len() >= world.config.powerup_cap {
        return None;
    }

    let powerup_type = *world.rng.choose(&PowerUpType::ALL)?;
    let position = world
        .rng
        .random_position(world.config.world_width, world.config.world_height);
    let powerup = PowerUp {
        id: EntityId::generate(),
        powerup_type,
        position,
        spawned_at: now,
    };
    let id = powerup.id.clone();

    info!(powerup = ?powerup_type, x = position.x, y = position.y, "Power-up spawned");
    world.broadcast(&ServerMessage::PowerupSpawn {
        powerup_id: id.clone(),
        position: Position::at(position),
        powerup: powerup_type,
    });
    world.powerups.insert(id.clone(), powerup);
    Some(id)
}

/// Delay before the next power-up spawn attempt, whole seconds in the
/// configured range.
pub fn next_powerup_delay(world: &mut World) -> Duration {
    let secs = world.rng.next_int_range(
        world.config.powerup_interval_min_secs,
        world.config.powerup_interval_max_secs,
    );
    Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::world::testing::*;

    #[test]
    fn test_weapon_cap() {
        let mut world = world();
        let (_a, mut rx, _k) = join(&mut world, 1, Vec2::ZERO);
        let now = Instant::now();

        for _ in 0..20 {
            spawn_weapon(&mut world, now);
            assert!(world.weapons.len() <= 5);
        }
        assert_eq!(world.weapons.len(), 5);
        assert_eq!(drain(&mut rx).len(), 5);

        for w in world.weapons.values() {
            assert!(SPAWNABLE_WEAPONS.contains(&w.weapon_type));
            assert!((0.0..1000.0).contains(&w.position.x));
            assert!((0.0..600.0).contains(&w.position.y));
        }
    }

    #[test]
    fn test_powerup_cap() {
        let mut world = world();
        let now = Instant::now();
        for _ in 0..10 {
            spawn_powerup(&mut world, now);
            assert!(world.powerups.len() <= 3);
        }
        assert_eq!(world.powerups.len(), 3);
    }

    #[test]
    fn test_inactive_match_spawns_nothing() {
        let mut world = world();
        world.match_active = false;
        let now = Instant::now();
        assert!(spawn_weapon(&mut world, now).is_none());
        assert!(spawn_powerup(&mut world, now).is_none());
        assert!(world.weapons.is_empty() && world.powerups.is_empty());
    }

    #[test]
    fn test_powerup_delay_range() {
        let mut world = world();
        for _ in 0..200 {
            let d = next_powerup_delay(&mut world);
            assert!(d >= Duration::from_secs(15) && d <= Duration::from_secs(45));
        }
    }
}
