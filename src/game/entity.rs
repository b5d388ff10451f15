//! Entity Model
//!
//! Players, bullets and world pickups, plus the identifiers that key them
//! in the [`World`](crate::game::world::World).

use std::fmt;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::weapon::WeaponType;
use crate::network::connection::Connection;
use crate::persistence::PlayerRecord;

/// Full health.
pub const MAX_HEALTH: i32 = 100;

/// Full force-field shield.
pub const MAX_SHIELD: i32 = 100;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Persistent player identifier, assigned by the player store.
///
/// Sent to clients as a decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Create from the store's numeric id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0.to_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(PlayerId)
    }
}

/// Identifier for bullets, world weapons and power-ups.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// POWER-UPS
// =============================================================================

/// Power-up type tag, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpType {
    /// Grants the teleport ability.
    Teleportation,
    /// Grants a 100 point damage-absorbing shield.
    ForceField,
    /// Regenerates health for a limited time.
    HealthRegen,
}

impl PowerUpType {
    /// Every power-up type, in spawner draw order.
    pub const ALL: [PowerUpType; 3] = [
        PowerUpType::Teleportation,
        PowerUpType::ForceField,
        PowerUpType::HealthRegen,
    ];
}

/// Power-up resources held by a player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerUpState {
    /// Teleport may be used.
    pub teleport_available: bool,
    /// Force field is absorbing damage.
    pub force_field_active: bool,
    /// Remaining shield points, `0..=MAX_SHIELD`.
    pub shield: i32,
    /// Health regeneration is running.
    pub regen_active: bool,
    /// When the regen effect ends.
    pub regen_expiry: Option<Instant>,
    /// Fractional health carried between ticks.
    pub regen_accumulator: f64,
}

impl PowerUpState {
    /// Drop every resource.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Outcome of one hit on a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// Damage absorbed by the shield.
    pub absorbed: i32,
    /// Damage applied to health.
    pub applied: i32,
    /// Health reached zero.
    pub killed: bool,
}

/// A player in the world.
#[derive(Debug)]
pub struct Player {
    /// Persistent id.
    pub id: PlayerId,
    /// Session the player reconnects with.
    pub session_id: String,
    /// Display name.
    pub username: String,
    /// 24-bit RGB colour.
    pub color: u32,
    /// Kills this process has seen (mirrors the store).
    pub kills: u32,
    /// Deaths this process has seen (mirrors the store).
    pub deaths: u32,

    /// Current health, `0..=MAX_HEALTH`.
    pub health: i32,
    /// Held weapon.
    pub weapon: WeaponType,
    /// Dead and waiting to respawn.
    pub is_dead: bool,
    /// Wall-clock death time, reported to clients.
    pub death_time: Option<DateTime<Utc>>,
    /// Monotonic death instant.
    pub died_at: Option<Instant>,
    /// Respawn deadline while dead.
    pub respawn_at: Option<Instant>,

    /// Live position.
    pub position: Vec2,
    /// Facing, radians.
    pub rotation: f64,
    /// Client-reported position awaiting the next tick.
    pub pending_position: Option<Vec2>,
    /// Knockback velocity.
    pub velocity: Vec2,
    /// Most recent valid position reported or reached.
    pub last_known_position: Vec2,

    /// Power-up resources.
    pub powerups: PowerUpState,

    /// Live connection, if any. At most one per player.
    pub connection: Option<Connection>,
    /// When the last connection dropped, while disconnected.
    pub disconnected_at: Option<Instant>,
}

impl Player {
    /// Fresh, alive player for a persisted identity.
    pub fn new(record: &PlayerRecord, color: u32, position: Vec2) -> Self {
        Self {
            id: PlayerId::new(record.id),
            session_id: record.session_id.clone(),
            username: record.username.clone(),
            color,
            kills: record.kills,
            deaths: record.deaths,
            health: MAX_HEALTH,
            weapon: WeaponType::default(),
            is_dead: false,
            death_time: None,
            died_at: None,
            respawn_at: None,
            position,
            rotation: 0.0,
            pending_position: None,
            velocity: Vec2::ZERO,
            last_known_position: position,
            powerups: PowerUpState::default(),
            connection: None,
            disconnected_at: None,
        }
    }

    /// Has a live connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Apply `damage`, draining the shield first.
    ///
    /// Overflow past the shield disables the force field and spills onto
    /// health. Dead players take nothing.
    pub fn apply_damage(&mut self, damage: i32) -> DamageOutcome {
        let damage = damage.max(0);
        if self.is_dead {
            return DamageOutcome { absorbed: 0, applied: 0, killed: false };
        }

        let mut remaining = damage;
        let mut absorbed = 0;
        if self.powerups.force_field_active && self.powerups.shield > 0 {
            absorbed = remaining.min(self.powerups.shield);
            self.powerups.shield -= absorbed;
            remaining -= absorbed;
            if self.powerups.shield == 0 {
                self.powerups.force_field_active = false;
            }
        }

        let before = self.health;
        self.health = (self.health - remaining).clamp(0, MAX_HEALTH);

        DamageOutcome {
            absorbed,
            applied: before - self.health,
            killed: self.health <= 0,
        }
    }

    /// Heal by `amount`, clamped at full health. Returns true if clamped.
    pub fn heal(&mut self, amount: i32) -> bool {
        let raw = self.health.saturating_add(amount.max(0));
        self.health = raw.min(MAX_HEALTH);
        raw > MAX_HEALTH
    }

    /// Wall-clock death time as unix seconds, 0 when alive.
    pub fn death_time_unix(&self) -> i64 {
        self.death_time.map(|t| t.timestamp()).unwrap_or(0)
    }
}

// =============================================================================
// PROJECTILES & PICKUPS
// =============================================================================

/// A bullet in flight.
#[derive(Debug, Clone)]
pub struct Bullet {
    /// Bullet id.
    pub id: EntityId,
    /// Shooter. May outlive the shooter's player entry.
    pub owner: PlayerId,
    /// Current position.
    pub position: Vec2,
    /// Heading, radians.
    pub rotation: f64,
    /// Units per second.
    pub speed: f64,
    /// Seconds left.
    pub lifetime: f64,
}

/// A weapon lying in the world.
#[derive(Debug, Clone)]
pub struct WorldWeapon {
    /// Pickup id.
    pub id: EntityId,
    /// Weapon granted on pickup.
    pub weapon_type: WeaponType,
    /// Position.
    pub position: Vec2,
    /// Spawn instant, for despawn.
    pub spawned_at: Instant,
}

/// A power-up lying in the world.
#[derive(Debug, Clone)]
pub struct PowerUp {
    /// Pickup id.
    pub id: EntityId,
    /// Effect granted on pickup.
    pub powerup_type: PowerUpType,
    /// Position.
    pub position: Vec2,
    /// Spawn instant, for despawn.
    pub spawned_at: Instant,
}
