//! Weapons
//!
//! Weapon types, their ballistic profiles and firing patterns.

use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Weapon type tag, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    /// Default weapon.
    Pistol,
    /// Eight-pellet spread.
    Shotgun,
    /// Fast, light bullets.
    MachineGun,
    /// Slow, heavy projectile.
    RocketLauncher,
    /// Very fast, very light beam segments.
    Laser,
}

/// Weapon types the pickup spawner draws from.
pub const SPAWNABLE_WEAPONS: [WeaponType; 3] = [
    WeaponType::Pistol,
    WeaponType::Shotgun,
    WeaponType::MachineGun,
];

/// Static per-weapon ballistic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallisticProfile {
    /// Minimum interval between shots. Advisory; the server does not throttle.
    pub fire_interval: Duration,
    /// Damage per hit.
    pub damage: i32,
    /// Bullet speed (units per second).
    pub speed: f64,
    /// Bullet lifetime (seconds).
    pub lifetime: f64,
}

impl WeaponType {
    /// Ballistic profile for this weapon. Total over the enum, so every
    /// weapon a player or pickup can hold has one.
    pub const fn profile(self) -> BallisticProfile {
        match self {
            WeaponType::Pistol => BallisticProfile {
                fire_interval: Duration::from_millis(500),
                damage: 21,
                speed: 550.0,
                lifetime: 1.2,
            },
            WeaponType::Shotgun => BallisticProfile {
                fire_interval: Duration::from_millis(1000),
                damage: 14,
                speed: 500.0,
                lifetime: 0.5,
            },
            WeaponType::MachineGun => BallisticProfile {
                fire_interval: Duration::from_millis(100),
                damage: 7,
                speed: 700.0,
                lifetime: 0.725,
            },
            WeaponType::RocketLauncher => BallisticProfile {
                fire_interval: Duration::from_millis(1000),
                damage: 40,
                speed: 400.0,
                lifetime: 1.5,
            },
            WeaponType::Laser => BallisticProfile {
                fire_interval: Duration::from_millis(20),
                damage: 2,
                speed: 2500.0,
                lifetime: 2.0,
            },
        }
    }

    /// Bullet headings (radians) produced by one shot at `rotation`.
    ///
    /// The shotgun fans out eight pellets at `rotation + k * 5deg` for
    /// `k` in `-3..=4`; everything else fires a single bullet.
    pub fn shot_angles(self, rotation: f64) -> Vec<f64> {
        match self {
            WeaponType::Shotgun => (-3..=4)
                .map(|k| rotation + (k as f64 * 5.0).to_radians())
                .collect(),
            _ => vec![rotation],
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            WeaponType::Pistol => "pistol",
            WeaponType::Shotgun => "shotgun",
            WeaponType::MachineGun => "machine_gun",
            WeaponType::RocketLauncher => "rocket_launcher",
            WeaponType::Laser => "laser",
        }
    }
}

impl Default for WeaponType {
    fn default() -> Self {
        WeaponType::Pistol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pistol_profile() {
        let p = WeaponType::Pistol.profile();
        assert_eq!(p.damage, 21);
        assert_eq!(p.speed, 550.0);
        assert_eq!(p.lifetime, 1.2);
        assert_eq!(p.fire_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_shotgun_spread() {
        let rotation = 0.3;
        let angles = WeaponType::Shotgun.shot_angles(rotation);
        assert_eq!(angles.len(), 8);
        for (angle, k) in angles.iter().zip(-3..=4) {
            let expected = rotation + (k as f64) * 5.0 * std::f64::consts::PI / 180.0;
            assert!((angle - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_shot_weapons() {
        for w in [
            WeaponType::Pistol,
            WeaponType::MachineGun,
            WeaponType::RocketLauncher,
            WeaponType::Laser,
        ] {
            assert_eq!(w.shot_angles(1.0), vec![1.0]);
        }
    }

    #[test]
    fn test_wire_names() {
        for w in [
            WeaponType::Pistol,
            WeaponType::Shotgun,
            WeaponType::MachineGun,
            WeaponType::RocketLauncher,
            WeaponType::Laser,
        ] {
            let json = serde_json::to_string(&w).unwrap();
            assert_eq!(json, format!("\"{}\"", w.as_str()));
        }
    }
}
