//! Player Commands
//!
//! Gameplay commands decoded from a session and applied to the world under
//! its lock. Positions are buffered for the tick rather than applied here.

use tracing::debug;

use crate::core::vec2::Vec2;
use crate::game::entity::{Bullet, EntityId, PlayerId};
use crate::game::world::World;
use crate::network::protocol::{Position, ServerMessage};
use crate::persistence::StoreWrite;

/// A gameplay command from one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Report a new position.
    Move {
        /// Reported position.
        position: Vec2,
        /// Reported facing.
        rotation: f64,
    },
    /// Fire the held weapon.
    Shoot {
        /// Aim, radians.
        rotation: f64,
    },
    /// Teleport towards a cursor.
    Teleport {
        /// Cursor position, if the client sent one.
        cursor: Option<Vec2>,
    },
}

/// Result of applying a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome {
    /// Position buffered for the next tick.
    Moved,
    /// This many bullets were created.
    Fired(usize),
    /// Player moved here.
    Teleported(Vec2),
    /// Nothing changed.
    Ignored,
}

/// Apply one command for `player_id`.
///
/// Dead or unknown players are ignored, as are invalid positions,
/// shots while the match is inactive and teleports without the resource
/// or a cursor.
pub fn apply_command(world: &mut World, player_id: PlayerId, command: Command) -> CommandOutcome {
    let alive = world.players.get(&player_id).map_or(false, |p| !p.is_dead);
    if !alive {
        return CommandOutcome::Ignored;
    }

    match command {
        Command::Move { position, rotation } => buffer_position(world, player_id, position, rotation),
        Command::Shoot { rotation } => shoot(world, player_id, rotation),
        Command::Teleport { cursor: Some(cursor) } => teleport(world, player_id, cursor),
        Command::Teleport { cursor: None } => CommandOutcome::Ignored,
    }
}

fn buffer_position(world: &mut World, player_id: PlayerId, position: Vec2, rotation: f64) -> CommandOutcome {
    if !position.is_valid_position() {
        debug!(player = %player_id, "Rejected invalid position");
        return CommandOutcome::Ignored;
    }
    let Some(player) = world.players.get_mut(&player_id) else {
        return CommandOutcome::Ignored;
    };

    player.pending_position = Some(position);
    player.last_known_position = position;
    if rotation.is_finite() {
        player.rotation = rotation;
    }

    let session_id = player.session_id.clone();
    world.push_store_write(StoreWrite::InsertPosition {
        session_id: session_id.clone(),
        player_id,
        position,
    });
    world.push_store_write(StoreWrite::UpdateLastKnown { session_id, player_id, position });
    CommandOutcome::Moved
}

fn shoot(world: &mut World, player_id: PlayerId, rotation: f64) -> CommandOutcome {
    // Bullets only advance while the match runs.
    if !world.match_active || !rotation.is_finite() {
        return CommandOutcome::Ignored;
    }
    let Some(player) = world.players.get(&player_id) else {
        return CommandOutcome::Ignored;
    };

    let profile = player.weapon.profile();
    let origin = player.position;
    let angles = player.weapon.shot_angles(rotation);
    let fired = angles.len();

    for angle in angles {
        let bullet = Bullet {
            id: EntityId::generate(),
            owner: player_id,
            position: origin,
            rotation: angle,
            speed: profile.speed,
            lifetime: profile.lifetime,
        };
        world.bullets.insert(bullet.id.clone(), bullet);
    }
    CommandOutcome::Fired(fired)
}

fn teleport(world: &mut World, player_id: PlayerId, cursor: Vec2) -> CommandOutcome {
    let distance = world.config.teleport_distance;
    let Some(player) = world.players.get_mut(&player_id) else {
        return CommandOutcome::Ignored;
    };
    if !player.powerups.teleport_available {
        return CommandOutcome::Ignored;
    }

    let angle = player.position.angle_to(cursor);
    let destination = player.position + Vec2::from_angle(angle) * distance;
    if !destination.is_valid_position() {
        return CommandOutcome::Ignored;
    }

    // The resource is kept: teleport stays available until death.
    player.position = destination;
    player.last_known_position = destination;
    player.pending_position = None;

    debug!(player = %player_id, x = destination.x, y = destination.y, "Teleported");
    world.broadcast(&ServerMessage::Teleport {
        player_id,
        position: Position::at(destination),
    });
    CommandOutcome::Teleported(destination)
}
