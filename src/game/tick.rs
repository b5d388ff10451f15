//! Authoritative Simulation Tick
//!
//! One fixed-rate step of the world, run under the world lock. The server
//! calls [`tick`] from a 60 Hz interval; tests call it directly with
//! synthetic instants.

use std::time::Instant;
use tracing::{debug, info};

use crate::core::vec2::Vec2;
use crate::game::collision::{resolve_push, within_radius};
use crate::game::entity::{EntityId, PlayerId, PowerUpType, WorldWeapon, MAX_HEALTH, MAX_SHIELD};
use crate::game::lifecycle::{kill_player, process_respawns, RespawnOutcome};
use crate::game::weapon::WeaponType;
use crate::game::world::{position_update, World};
use crate::network::protocol::{Position, ServerMessage};
use crate::persistence::StoreWrite;

/// One bullet hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Shooter.
    pub shooter: PlayerId,
    /// Victim.
    pub victim: PlayerId,
    /// Damage absorbed by the victim's shield.
    pub absorbed: i32,
    /// Damage applied to the victim's health.
    pub applied: i32,
    /// The hit was lethal.
    pub killed: bool,
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// The match was active and the tick ran.
    pub ran: bool,
    /// Players brought back this tick.
    pub respawned: Vec<PlayerId>,
    /// Disconnected players removed at their respawn deadline.
    pub removed: Vec<PlayerId>,
    /// Bullet hits, in resolution order.
    pub hits: Vec<Hit>,
    /// Whether a full position broadcast was sent.
    pub positions_broadcast: bool,
}

/// Run one simulation tick.
///
/// No-op while the match is inactive. Otherwise, in order: respawn
/// deadlines, bullet flight and hits, knockback integration, bullet
/// expiry, weapon and power-up pickup/despawn, buffered positions,
/// player separation, the position broadcast and regeneration.
pub fn tick(world: &mut World, now: Instant) -> TickResult {
    let mut result = TickResult::default();
    if !world.match_active {
        return result;
    }
    result.ran = true;

    // 1. Respawn deadlines
    for (id, outcome) in process_respawns(world, now) {
        match outcome {
            RespawnOutcome::Respawned(_) => result.respawned.push(id),
            RespawnOutcome::Removed => result.removed.push(id),
            RespawnOutcome::Skipped => {}
        }
    }

    // 2. Bullet flight and hit resolution
    advance_bullets(world, now, &mut result);

    // 3. Knockback
    let knocked = integrate_velocity(world);

    // 4. Expiry and bullet updates
    expire_bullets(world);

    // 5. Weapons
    update_weapons(world, now);

    // 6. Power-ups
    update_powerups(world, now);

    // 7. Buffered positions
    let applied = apply_pending_positions(world);

    // 8. Separation
    separate_players(world);

    // 9. Position broadcast
    if applied || knocked {
        let updates: Vec<ServerMessage> = world.players.values().map(position_update).collect();
        for msg in &updates {
            world.broadcast(msg);
        }
        result.positions_broadcast = true;
    }

    // 10. Regeneration
    regenerate(world, now);

    result
}

fn advance_bullets(world: &mut World, now: Instant, result: &mut TickResult) {
    let dt = world.config.tick_seconds();
    let hit_radius = world.config.hit_radius;
    let ids: Vec<EntityId> = world.bullets.keys().cloned().collect();

    for id in ids {
        let Some(bullet) = world.bullets.get_mut(&id) else {
            continue;
        };
        bullet.position += Vec2::from_angle(bullet.rotation) * (bullet.speed * dt);
        bullet.lifetime -= dt;
        let (position, owner, rotation) = (bullet.position, bullet.owner, bullet.rotation);

        // A bullet whose shooter is gone cannot be attributed and does no damage.
        let Some(weapon) = world.players.get(&owner).map(|p| p.weapon) else {
            continue;
        };

        let victim = world
            .players
            .values()
            .find(|p| p.id != owner && !p.is_dead && within_radius(position, p.position, hit_radius))
            .map(|p| p.id);

        if let Some(victim) = victim {
            world.bullets.remove(&id);
            let hit = resolve_hit(world, owner, victim, weapon, rotation, now);
            result.hits.push(hit);
        }
    }
}

fn resolve_hit(
    world: &mut World,
    shooter: PlayerId,
    victim: PlayerId,
    weapon: WeaponType,
    rotation: f64,
    now: Instant,
) -> Hit {
    let impulse = world.config.knockback_impulse;
    let damage = weapon.profile().damage;

    let Some(target) = world.players.get_mut(&victim) else {
        return Hit { shooter, victim, absorbed: 0, applied: 0, killed: false };
    };
    let outcome = target.apply_damage(damage);
    let victim_session = target.session_id.clone();
    if !outcome.killed {
        target.velocity += Vec2::from_angle(rotation) * impulse;
    }

    if outcome.killed {
        kill_player(world, victim, now);
        if let Some(killer) = world.players.get_mut(&shooter) {
            killer.kills = killer.kills.saturating_add(1);
            let session_id = killer.session_id.clone();
            info!(killer = %shooter, victim = %victim, "Kill");
            world.push_store_write(StoreWrite::UpdateStats { session_id, kills: 1, deaths: 0 });
        }
        world.push_store_write(StoreWrite::UpdateStats {
            session_id: victim_session,
            kills: 0,
            deaths: 1,
        });
    }

    let health = world.players.get(&victim).map_or(0, |p| p.health);
    world.broadcast(&ServerMessage::HealthUpdate { player_id: victim, health });

    Hit {
        shooter,
        victim,
        absorbed: outcome.absorbed,
        applied: outcome.applied,
        killed: outcome.killed,
    }
}

fn integrate_velocity(world: &mut World) -> bool {
    let dt = world.config.tick_seconds();
    let damping = world.config.velocity_damping;
    let rest = world.config.velocity_rest_threshold;
    let mut moved = false;

    for player in world.players.values_mut().filter(|p| !p.is_dead) {
        if player.velocity.is_zero() {
            continue;
        }
        player.position += player.velocity * dt;
        player.velocity = player.velocity * damping;
        if player.velocity.length() < rest {
            player.velocity = Vec2::ZERO;
        }
        if !player.position.is_valid_position() {
            player.position = player.last_known_position;
        }
        moved = true;
    }
    moved
}

fn expire_bullets(world: &mut World) {
    world.bullets.retain(|_, b| b.lifetime > 0.0);

    let updates: Vec<ServerMessage> = world
        .bullets
        .values()
        .map(|b| ServerMessage::BulletUpdate {
            player_id: b.owner,
            bullet_id: b.id.clone(),
            position: Position::new(b.position, b.rotation),
        })
        .collect();
    for msg in &updates {
        world.broadcast(msg);
    }
}

fn update_weapons(world: &mut World, now: Instant) {
    let despawn_after = world.config.despawn_after;
    let radius = world.config.hit_radius;
    let drop_offset = world.config.weapon_drop_offset;
    let ids: Vec<EntityId> = world.weapons.keys().cloned().collect();

    for id in ids {
        let Some(weapon) = world.weapons.get(&id).cloned() else {
            continue;
        };

        let expired = now.saturating_duration_since(weapon.spawned_at) > despawn_after;
        if expired || !weapon.position.is_valid_position() {
            world.weapons.remove(&id);
            world.broadcast(&ServerMessage::WeaponDespawn { weapon_id: id });
            continue;
        }

        let Some(player) = world
            .players
            .values_mut()
            .find(|p| p.weapon != weapon.weapon_type && within_radius(weapon.position, p.position, radius))
        else {
            continue;
        };

        let player_id = player.id;
        let previous = std::mem::replace(&mut player.weapon, weapon.weapon_type);
        let drop_at = player.position + drop_offset;

        world.weapons.remove(&id);
        debug!(player = %player_id, weapon = weapon.weapon_type.as_str(), "Weapon picked up");
        world.broadcast(&ServerMessage::WeaponPickup {
            player_id,
            weapon_id: id,
            weapon: weapon.weapon_type,
        });

        if drop_at.is_valid_position() {
            let dropped = WorldWeapon {
                id: EntityId::generate(),
                weapon_type: previous,
                position: drop_at,
                spawned_at: now,
            };
            world.broadcast(&ServerMessage::WeaponSpawn {
                weapon_id: dropped.id.clone(),
                position: Position::at(drop_at),
                weapon: previous,
            });
            world.weapons.insert(dropped.id.clone(), dropped);
        }
    }
}

fn update_powerups(world: &mut World, now: Instant) {
    let despawn_after = world.config.despawn_after;
    let radius = world.config.hit_radius;
    let regen_duration = world.config.regen_duration;
    let ids: Vec<EntityId> = world.powerups.keys().cloned().collect();

    for id in ids {
        let Some(powerup) = world.powerups.get(&id).cloned() else {
            continue;
        };

        let expired = now.saturating_duration_since(powerup.spawned_at) > despawn_after;
        if expired || !powerup.position.is_valid_position() {
            world.powerups.remove(&id);
            world.broadcast(&ServerMessage::PowerupDespawn { powerup_id: id });
            continue;
        }

        let Some(player) = world
            .players
            .values_mut()
            .find(|p| !p.is_dead && within_radius(powerup.position, p.position, radius))
        else {
            continue;
        };

        // One effect at a time.
        player.powerups.clear();
        match powerup.powerup_type {
            PowerUpType::Teleportation => player.powerups.teleport_available = true,
            PowerUpType::ForceField => {
                player.powerups.force_field_active = true;
                player.powerups.shield = MAX_SHIELD;
            }
            PowerUpType::HealthRegen => {
                player.powerups.regen_active = true;
                player.powerups.regen_expiry = Some(now + regen_duration);
                player.powerups.regen_accumulator = 0.0;
            }
        }
        let player_id = player.id;

        world.powerups.remove(&id);
        debug!(player = %player_id, powerup = ?powerup.powerup_type, "Power-up picked up");
        world.broadcast(&ServerMessage::PowerupPickup {
            player_id,
            powerup_id: id,
            powerup: powerup.powerup_type,
        });
    }
}

fn apply_pending_positions(world: &mut World) -> bool {
    let default_spawn = world.config.default_spawn;
    let mut changed = false;

    for player in world.players.values_mut() {
        if let Some(pending) = player.pending_position.take() {
            player.position = if pending.is_valid_position() { pending } else { default_spawn };
            changed = true;
        }
    }
    changed
}

fn separate_players(world: &mut World) {
    let radius = world.config.separation_radius;
    let force = world.config.push_force;
    let ids: Vec<PlayerId> = world.players.keys().copied().collect();

    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            let (Some(pa), Some(pb)) = (
                world.players.get(a).map(|p| p.position),
                world.players.get(b).map(|p| p.position),
            ) else {
                continue;
            };

            let (push_a, push_b) = resolve_push(pa, radius, pb, radius, force);
            if push_a.is_zero() && push_b.is_zero() {
                continue;
            }
            let (next_a, next_b) = (pa + push_a, pb + push_b);
            if !next_a.is_valid_position() || !next_b.is_valid_position() {
                continue;
            }

            let mut updates = Vec::with_capacity(2);
            for (id, next) in [(a, next_a), (b, next_b)] {
                if let Some(player) = world.players.get_mut(id) {
                    player.position = next;
                    updates.push(position_update(player));
                }
            }
            for msg in &updates {
                world.broadcast(msg);
            }
        }
    }
}

fn regenerate(world: &mut World, now: Instant) {
    let per_tick = world.config.regen_per_second * world.config.tick_seconds();
    let mut updates = Vec::new();

    for player in world.players.values_mut().filter(|p| p.powerups.regen_active && !p.is_dead) {
        let expired = player.powerups.regen_expiry.map_or(true, |at| now >= at);
        if expired {
            player.powerups.regen_active = false;
            player.powerups.regen_expiry = None;
            player.powerups.regen_accumulator = 0.0;
            continue;
        }
        if player.health >= MAX_HEALTH {
            continue;
        }

        player.powerups.regen_accumulator += per_tick;
        if player.powerups.regen_accumulator >= 1.0 {
            let whole = player.powerups.regen_accumulator.floor();
            player.powerups.regen_accumulator -= whole;
            if player.heal(whole as i32) {
                player.powerups.regen_accumulator = 0.0;
            }
            updates.push(ServerMessage::HealthUpdate {
                player_id: player.id,
                health: player.health,
            });
        }
    }

    for msg in &updates {
        world.broadcast(msg);
    }
}
