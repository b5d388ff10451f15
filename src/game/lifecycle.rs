//! Player Lifecycle
//!
//! Alive -> Dead -> Alive, driven by a per-player respawn deadline that the
//! tick checks, plus final removal of players whose connection is gone.

use std::time::Instant;
use chrono::Utc;
use tracing::info;

use crate::core::rng::GameRng;
use crate::core::vec2::Vec2;
use crate::game::entity::{Player, PlayerId, MAX_HEALTH};
use crate::game::weapon::WeaponType;
use crate::game::world::World;
use crate::network::protocol::{Position, ServerMessage};
use crate::persistence::StoreWrite;

/// What happened when a respawn deadline was serviced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RespawnOutcome {
    /// Player is alive again at this point.
    Respawned(Vec2),
    /// Player had no connection and was removed instead.
    Removed,
    /// No such player, or the player was not dead.
    Skipped,
}

/// Transition a living player to dead.
///
/// Snaps the corpse to its last known valid position, strips every
/// power-up resource, arms the respawn deadline and broadcasts
/// `player_death`. Returns false if the player is missing or already dead.
pub fn kill_player(world: &mut World, victim: PlayerId, now: Instant) -> bool {
    let delay = world.config.respawn_delay;
    let default_spawn = world.config.default_spawn;

    let Some(player) = world.players.get_mut(&victim) else {
        return false;
    };
    if player.is_dead {
        return false;
    }

    player.is_dead = true;
    player.health = 0;
    player.death_time = Some(Utc::now());
    player.died_at = Some(now);
    player.respawn_at = Some(now + delay);
    player.position = if player.last_known_position.is_valid_position() {
        player.last_known_position
    } else {
        default_spawn
    };
    player.pending_position = None;
    player.velocity = Vec2::ZERO;
    player.powerups.clear();
    player.deaths = player.deaths.saturating_add(1);

    let msg = death_message(player);
    info!(player = %victim, "Player died");
    world.broadcast(&msg);
    true
}

/// `player_death` for a dead player.
pub fn death_message(player: &Player) -> ServerMessage {
    ServerMessage::PlayerDeath {
        player_id: player.id,
        position: Position::at(player.position),
        death_time: player.death_time_unix(),
    }
}

/// Bring a dead player back, or remove it if nobody is connected.
pub fn respawn_player(world: &mut World, id: PlayerId) -> RespawnOutcome {
    let connected = match world.players.get(&id) {
        Some(p) if p.is_dead => p.is_connected(),
        _ => return RespawnOutcome::Skipped,
    };

    if !connected {
        remove_player(world, id);
        return RespawnOutcome::Removed;
    }

    let living = world.living_positions();
    let spawn = choose_spawn_point(
        &mut world.rng,
        &world.config.spawn_points,
        &living,
        world.config.safe_spawn_distance,
        world.config.spawn_attempts,
        world.config.default_spawn,
    );

    let Some(player) = world.players.get_mut(&id) else {
        return RespawnOutcome::Skipped;
    };
    player.powerups.clear();
    player.is_dead = false;
    player.health = MAX_HEALTH;
    player.weapon = WeaponType::default();
    player.death_time = None;
    player.died_at = None;
    player.respawn_at = None;
    player.position = spawn;
    player.last_known_position = spawn;
    player.pending_position = None;
    player.velocity = Vec2::ZERO;

    let msg = ServerMessage::PlayerRespawn {
        player_id: id,
        position: Position::at(spawn),
        health: player.health,
        weapon: player.weapon,
    };
    info!(player = %id, x = spawn.x, y = spawn.y, "Player respawned");
    world.broadcast(&msg);
    world.send_to(&id, msg);
    RespawnOutcome::Respawned(spawn)
}

/// Service every respawn deadline that has passed.
pub fn process_respawns(world: &mut World, now: Instant) -> Vec<(PlayerId, RespawnOutcome)> {
    let due: Vec<PlayerId> = world
        .players
        .values()
        .filter(|p| p.is_dead && p.respawn_at.map_or(false, |at| at <= now))
        .map(|p| p.id)
        .collect();

    due.into_iter()
        .map(|id| (id, respawn_player(world, id)))
        .collect()
}

/// Re-derive a dead player's respawn deadline from its death instant.
///
/// Called when a session reattaches mid-death. If the window has already
/// elapsed the player respawns immediately. Returns the time left, if any.
pub fn reconcile_respawn(world: &mut World, id: PlayerId, now: Instant) -> Option<std::time::Duration> {
    let delay = world.config.respawn_delay;
    let player = world.players.get_mut(&id)?;
    if !player.is_dead {
        return None;
    }

    let died_at = *player.died_at.get_or_insert(now);
    let elapsed = now.saturating_duration_since(died_at);
    if elapsed >= delay {
        respawn_player(world, id);
        None
    } else {
        let remaining = delay - elapsed;
        player.respawn_at = Some(now + remaining);
        Some(remaining)
    }
}

/// Delete a player, forget its session in the store and tell everyone.
pub fn remove_player(world: &mut World, id: PlayerId) -> Option<Player> {
    let mut player = world.players.remove(&id)?;
    if let Some(conn) = player.connection.take() {
        conn.close();
    }
    world.push_store_write(StoreWrite::RemovePlayer {
        session_id: player.session_id.clone(),
    });
    world.broadcast(&ServerMessage::PlayerDisconnect { player_id: id });
    info!(player = %id, session = %player.session_id, "Player removed");
    Some(player)
}

/// Remove a player whose grace window has run out without a reconnect.
///
/// A player that reconnected, or dropped again more recently, is kept.
pub fn remove_if_abandoned(world: &mut World, id: PlayerId, now: Instant) -> bool {
    let grace = world.config.grace_window;
    let abandoned = world.players.get(&id).map_or(false, |p| {
        p.connection.is_none()
            && p.disconnected_at
                .map_or(true, |at| now.saturating_duration_since(at) >= grace)
    });
    if abandoned {
        remove_player(world, id);
    }
    abandoned
}

/// Pick a respawn point at least `safe_distance` from every living player.
///
/// Samples candidates up to `attempts` times, then falls back to the
/// candidate farthest from its nearest living player. With no candidates
/// at all, returns `fallback`.
pub fn choose_spawn_point(
    rng: &mut GameRng,
    candidates: &[Vec2],
    living: &[Vec2],
    safe_distance: f64,
    attempts: u32,
    fallback: Vec2,
) -> Vec2 {
    let clearance = |point: Vec2| {
        living
            .iter()
            .map(|p| p.distance(point))
            .fold(f64::INFINITY, f64::min)
    };

    for _ in 0..attempts {
        match rng.choose(candidates) {
            Some(&point) if clearance(point) > safe_distance => return point,
            Some(_) => continue,
            None => return fallback,
        }
    }

    candidates
        .iter()
        .copied()
        .fold(None, |best: Option<(Vec2, f64)>, point| {
            let c = clearance(point);
            match best {
                Some((_, best_c)) if best_c >= c => best,
                _ => Some((point, c)),
            }
        })
        .map(|(point, _)| point)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::game::world::testing::*;

    #[test]
    fn test_kill_strips_powerups_and_broadcasts() {
        let mut world = world();
        let now = Instant::now();
        let (a, mut rx, _k) = join(&mut world, 1, Vec2::new(200.0, 200.0));
        {
            let p = world.players.get_mut(&a).unwrap();
            p.last_known_position = Vec2::new(190.0, 200.0);
            p.powerups.teleport_available = true;
            p.powerups.force_field_active = true;
            p.powerups.shield = 40;
            p.powerups.regen_active = true;
            p.velocity = Vec2::new(50.0, 0.0);
        }

        assert!(kill_player(&mut world, a, now));
        assert!(!kill_player(&mut world, a, now));

        let p = &world.players[&a];
        assert!(p.is_dead);
        assert_eq!(p.health, 0);
        assert_eq!(p.position, Vec2::new(190.0, 200.0));
        assert_eq!(p.respawn_at, Some(now + Duration::from_secs(3)));
        assert_eq!(p.powerups, Default::default());
        assert!(p.velocity.is_zero());
        assert!(p.death_time.is_some());

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], ServerMessage::PlayerDeath { player_id, .. } if player_id == a));
    }

    #[test]
    fn test_respawn_after_delay() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, mut rx, _k) = join(&mut world, 1, Vec2::new(200.0, 200.0));
        world.players.get_mut(&a).unwrap().weapon = WeaponType::Shotgun;
        kill_player(&mut world, a, t0);
        drain(&mut rx);

        assert!(process_respawns(&mut world, t0 + Duration::from_millis(2900)).is_empty());
        assert!(world.players[&a].is_dead);

        let done = process_respawns(&mut world, t0 + Duration::from_secs(3));
        assert_eq!(done.len(), 1);
        assert!(matches!(done[0].1, RespawnOutcome::Respawned(_)));

        let p = &world.players[&a];
        assert!(!p.is_dead);
        assert_eq!(p.health, MAX_HEALTH);
        assert_eq!(p.weapon, WeaponType::Pistol);
        assert!(p.respawn_at.is_none());
        assert!(world.config.spawn_points.contains(&p.position));

        // broadcast plus the direct copy
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| m.kind() == "player_respawn"));
    }

    #[test]
    fn test_disconnected_player_removed_instead_of_respawned() {
        let mut world = world();
        let t0 = Instant::now();
        let (_watcher, mut rx, _k) = join(&mut world, 1, Vec2::new(900.0, 100.0));
        let ghost = join_disconnected(&mut world, 2, Vec2::new(200.0, 200.0));
        kill_player(&mut world, ghost, t0);
        drain(&mut rx);

        let done = process_respawns(&mut world, t0 + Duration::from_secs(3));
        assert_eq!(done, vec![(ghost, RespawnOutcome::Removed)]);
        assert!(!world.players.contains_key(&ghost));
        assert_eq!(
            world.take_store_writes(),
            vec![StoreWrite::RemovePlayer { session_id: "session-2".into() }]
        );
        let msgs = drain(&mut rx);
        assert_eq!(msgs, vec![ServerMessage::PlayerDisconnect { player_id: ghost }]);
    }

    #[test]
    fn test_reconcile_keeps_remaining_time() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::new(200.0, 200.0));
        kill_player(&mut world, a, t0);

        let reconnect = t0 + Duration::from_millis(1500);
        let remaining = reconcile_respawn(&mut world, a, reconnect);
        assert_eq!(remaining, Some(Duration::from_millis(1500)));
        assert_eq!(world.players[&a].respawn_at, Some(reconnect + Duration::from_millis(1500)));
    }

    #[test]
    fn test_reconcile_respawns_when_window_passed() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::new(200.0, 200.0));
        kill_player(&mut world, a, t0);

        assert_eq!(reconcile_respawn(&mut world, a, t0 + Duration::from_secs(4)), None);
        assert!(!world.players[&a].is_dead);
    }

    #[test]
    fn test_reconcile_alive_is_noop() {
        let mut world = world();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::ZERO);
        assert_eq!(reconcile_respawn(&mut world, a, Instant::now()), None);
    }

    #[test]
    fn test_remove_if_abandoned() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::ZERO);
        assert!(!remove_if_abandoned(&mut world, a, t0));

        {
            let p = world.players.get_mut(&a).unwrap();
            p.connection = None;
            p.disconnected_at = Some(t0);
        }
        assert!(!remove_if_abandoned(&mut world, a, t0 + Duration::from_secs(2)));
        assert!(remove_if_abandoned(&mut world, a, t0 + Duration::from_secs(5)));
        assert!(world.players.is_empty());
    }

    #[test]
    fn test_spawn_point_avoids_living() {
        let mut rng = GameRng::new(1);
        let candidates = [Vec2::new(100.0, 100.0), Vec2::new(800.0, 500.0), Vec2::new(400.0, 300.0)];
        let living = [Vec2::new(110.0, 100.0), Vec2::new(400.0, 320.0)];
        for _ in 0..50 {
            let p = choose_spawn_point(&mut rng, &candidates, &living, 100.0, 32, Vec2::ZERO);
            assert_eq!(p, Vec2::new(800.0, 500.0));
        }
    }

    #[test]
    fn test_spawn_point_fallback_when_contested() {
        let mut rng = GameRng::new(2);
        let candidates = [Vec2::new(100.0, 100.0), Vec2::new(800.0, 500.0)];
        let living = [Vec2::new(100.0, 100.0), Vec2::new(760.0, 500.0)];
        let p = choose_spawn_point(&mut rng, &candidates, &living, 100.0, 8, Vec2::ZERO);
        assert_eq!(p, Vec2::new(800.0, 500.0));

        let none: [Vec2; 0] = [];
        let p = choose_spawn_point(&mut rng, &none, &living, 100.0, 8, Vec2::new(500.0, 300.0));
        assert_eq!(p, Vec2::new(500.0, 300.0));
    }
}
