//! World Store
//!
//! The single aggregate of live entities. Every task that reads or mutates
//! gameplay state goes through one `SharedWorld` lock held for its whole
//! critical section, so hit resolution can look up the shooter while it
//! mutates the victim without any lock ordering.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::rng::GameRng;
use crate::core::vec2::Vec2;
use crate::game::config::MatchConfig;
use crate::game::entity::{Bullet, EntityId, Player, PlayerId, PowerUp, WorldWeapon};
use crate::network::protocol::{Position, ServerMessage};
use crate::persistence::StoreWrite;

/// Handle passed to every task that touches the world.
pub type SharedWorld = Arc<RwLock<World>>;

/// All live gameplay state.
#[derive(Debug)]
pub struct World {
    /// Players by id, connected or within their grace window.
    pub players: BTreeMap<PlayerId, Player>,
    /// Bullets in flight.
    pub bullets: BTreeMap<EntityId, Bullet>,
    /// Weapons lying in the world.
    pub weapons: BTreeMap<EntityId, WorldWeapon>,
    /// Power-ups lying in the world.
    pub powerups: BTreeMap<EntityId, PowerUp>,
    /// Tick and spawners only run while set.
    pub match_active: bool,
    /// Gameplay tunables.
    pub config: MatchConfig,
    /// Randomness for spawners and spawn points.
    pub rng: GameRng,
    store_writes: Vec<StoreWrite>,
}

impl World {
    /// Empty world.
    pub fn new(config: MatchConfig, rng: GameRng) -> Self {
        Self {
            players: BTreeMap::new(),
            bullets: BTreeMap::new(),
            weapons: BTreeMap::new(),
            powerups: BTreeMap::new(),
            match_active: config.start_active,
            config,
            rng,
            store_writes: Vec::new(),
        }
    }

    /// Wrap in the shared lock.
    pub fn into_shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    /// Send a message to every connected player. Returns how many queued it.
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        self.players
            .values()
            .filter_map(|p| p.connection.as_ref())
            .filter(|conn| conn.send(msg.clone()))
            .count()
    }

    /// Send a message to one player, if connected.
    pub fn send_to(&self, player_id: &PlayerId, msg: ServerMessage) -> bool {
        self.players
            .get(player_id)
            .and_then(|p| p.connection.as_ref())
            .map(|conn| conn.send(msg))
            .unwrap_or(false)
    }

    /// Find the player owning a session.
    pub fn player_by_session(&self, session_id: &str) -> Option<PlayerId> {
        self.players
            .values()
            .find(|p| p.session_id == session_id)
            .map(|p| p.id)
    }

    /// Positions of every living player.
    pub fn living_positions(&self) -> Vec<Vec2> {
        self.players
            .values()
            .filter(|p| !p.is_dead)
            .map(|p| p.position)
            .collect()
    }

    /// Session ids of connected players.
    pub fn connected_sessions(&self) -> Vec<String> {
        self.players
            .values()
            .filter(|p| p.is_connected())
            .map(|p| p.session_id.clone())
            .collect()
    }

    /// Spawn messages for every pickup currently in the world.
    pub fn pickup_snapshot(&self) -> Vec<ServerMessage> {
        let weapons = self.weapons.values().map(|w| ServerMessage::WeaponSpawn {
            weapon_id: w.id.clone(),
            position: Position::at(w.position),
            weapon: w.weapon_type,
        });
        let powerups = self.powerups.values().map(|p| ServerMessage::PowerupSpawn {
            powerup_id: p.id.clone(),
            position: Position::at(p.position),
            powerup: p.powerup_type,
        });
        weapons.chain(powerups).collect()
    }

    /// Queue a store write for the next dispatch.
    pub fn push_store_write(&mut self, write: StoreWrite) {
        self.store_writes.push(write);
    }

    /// Take the queued store writes.
    pub fn take_store_writes(&mut self) -> Vec<StoreWrite> {
        std::mem::take(&mut self.store_writes)
    }

    /// Queue one position sample per connected player.
    pub fn queue_position_samples(&mut self) -> usize {
        let samples: Vec<StoreWrite> = self
            .players
            .values()
            .filter(|p| p.is_connected() && p.position.is_valid_position())
            .map(|p| StoreWrite::InsertPosition {
                session_id: p.session_id.clone(),
                player_id: p.id,
                position: p.position,
            })
            .collect();
        let count = samples.len();
        self.store_writes.extend(samples);
        count
    }
}

/// `position_update` for a player.
pub fn position_update(player: &Player) -> ServerMessage {
    ServerMessage::PositionUpdate {
        player_id: player.id,
        position: Position::new(player.position, player.rotation),
        color: player.color,
    }
}


#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::testing::*;
    use super::*;
    use crate::game::entity::PowerUpType;
    use crate::game::weapon::WeaponType;

    #[test]
    fn test_broadcast_skips_disconnected() {
        let mut world = world();
        let (a, mut rx_a, _ka) = join(&mut world, 1, Vec2::new(0.0, 0.0));
        let (_b, mut rx_b, _kb) = join(&mut world, 2, Vec2::new(100.0, 0.0));
        join_disconnected(&mut world, 3, Vec2::new(200.0, 0.0));

        let sent = world.broadcast(&ServerMessage::HealthUpdate { player_id: a, health: 50 });
        assert_eq!(sent, 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_send_to() {
        let mut world = world();
        let (a, mut rx_a, _ka) = join(&mut world, 1, Vec2::ZERO);
        let ghost = join_disconnected(&mut world, 2, Vec2::ZERO);

        assert!(world.send_to(&a, ServerMessage::PlayerDisconnect { player_id: ghost }));
        assert!(!world.send_to(&ghost, ServerMessage::PlayerDisconnect { player_id: a }));
        assert!(!world.send_to(&PlayerId::new(99), ServerMessage::PlayerDisconnect { player_id: a }));
        assert_eq!(drain(&mut rx_a).len(), 1);
    }

    #[test]
    fn test_lookup_helpers() {
        let mut world = world();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::new(1.0, 1.0));
        let b = join_disconnected(&mut world, 2, Vec2::new(2.0, 2.0));
        world.players.get_mut(&b).unwrap().is_dead = true;

        assert_eq!(world.player_by_session("session-1"), Some(a));
        assert_eq!(world.player_by_session("session-9"), None);
        assert_eq!(world.living_positions(), vec![Vec2::new(1.0, 1.0)]);
        assert_eq!(world.connected_sessions(), vec!["session-1".to_string()]);
    }

    #[test]
    fn test_pickup_snapshot() {
        let mut world = world();
        let now = Instant::now();
        let weapon = WorldWeapon {
            id: EntityId("w1".into()),
            weapon_type: WeaponType::Shotgun,
            position: Vec2::new(5.0, 5.0),
            spawned_at: now,
        };
        let powerup = PowerUp {
            id: EntityId("p1".into()),
            powerup_type: PowerUpType::ForceField,
            position: Vec2::new(6.0, 6.0),
            spawned_at: now,
        };
        world.weapons.insert(weapon.id.clone(), weapon);
        world.powerups.insert(powerup.id.clone(), powerup);

        let snapshot = world.pickup_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind(), "weapon_spawn");
        assert_eq!(snapshot[1].kind(), "powerup_spawn");
    }

    #[test]
    fn test_position_samples_only_connected() {
        let mut world = world();
        join(&mut world, 1, Vec2::new(1.0, 1.0));
        join_disconnected(&mut world, 2, Vec2::new(2.0, 2.0));

        assert_eq!(world.queue_position_samples(), 1);
        let writes = world.take_store_writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(&writes[0], StoreWrite::InsertPosition { session_id, .. } if session_id == "session-1"));
        assert!(world.take_store_writes().is_empty());
    }
}
