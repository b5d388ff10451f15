//! Player Sessions
//!
//! One task per accepted socket. A session reads the `session_init`
//! handshake, resolves the player under the world lock (reattaching to a
//! live player or admitting a new one), sends the initial sync and then
//! applies one client message per critical section until the socket closes
//! or the connection is replaced. Teardown detaches the connection and
//! schedules removal after the grace window.
//!
//! The world-facing steps are plain functions over `&mut World` so they can
//! be exercised without a socket.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, instrument, warn};

use crate::core::hash::session_color;
use crate::core::vec2::Vec2;
use crate::game::command::{apply_command, Command, CommandOutcome};
use crate::game::entity::{Player, PlayerId};
use crate::game::lifecycle::{death_message, reconcile_respawn, remove_if_abandoned};
use crate::game::world::{SharedWorld, World};
use crate::network::connection::{Connection, ConnectionId};
use crate::network::protocol::{ClientMessage, Handshake, Position, ServerMessage};
use crate::persistence::{Persistence, PlayerRecord, StoreError};

/// Session errors. All of them end the session; none affect the server.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Socket closed before the handshake arrived.
    #[error("Connection closed before handshake")]
    HandshakeClosed,

    /// No handshake within the deadline.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// First frame was not a usable handshake.
    #[error("Invalid handshake")]
    InvalidHandshake,

    /// Identity lookup failed.
    #[error("Identity resolution failed: {0}")]
    Store(#[from] StoreError),

    /// Transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

// =============================================================================
// WORLD-FACING STEPS
// =============================================================================

/// Attach a new connection to a live player.
///
/// Any previous connection is closed first. An invalid position is reset to
/// the default spawn. A dead player gets its death notification again and
/// keeps the remainder of its respawn window.
pub fn reattach_player(world: &mut World, id: PlayerId, connection: Connection, now: Instant) -> bool {
    let default_spawn = world.config.default_spawn;
    let Some(player) = world.players.get_mut(&id) else {
        return false;
    };

    if let Some(stale) = player.connection.replace(connection) {
        debug!(player = %id, connection = stale.id(), "Closing stale connection");
        stale.close();
    }
    player.disconnected_at = None;
    if !player.position.is_valid_position() {
        player.position = default_spawn;
    }

    if player.is_dead {
        let msg = death_message(player);
        world.send_to(&id, msg);
        reconcile_respawn(world, id, now);
    }
    true
}

/// Insert a newly resolved player, spawning at its last known position if
/// that is valid.
pub fn admit_player(
    world: &mut World,
    record: &PlayerRecord,
    last_known: Option<Vec2>,
    connection: Connection,
) -> PlayerId {
    let position = last_known
        .filter(|p| p.is_valid_position())
        .unwrap_or(world.config.default_spawn);

    let mut player = Player::new(record, session_color(&record.session_id), position);
    player.connection = Some(connection);
    let id = player.id;
    if let Some(previous) = world.players.insert(id, player) {
        warn!(player = %id, session = %previous.session_id, "Replaced player with the same id");
        if let Some(conn) = previous.connection {
            conn.close();
        }
    }
    id
}

/// Send `player_init` and the pickup snapshot to one player.
pub fn initial_sync(world: &World, id: PlayerId) -> bool {
    let Some(player) = world.players.get(&id) else {
        return false;
    };
    let init = ServerMessage::PlayerInit {
        player_id: player.id,
        color: player.color,
        position: Position::new(player.position, player.rotation),
        health: player.health,
        weapon: player.weapon,
        is_dead: player.is_dead,
        death_time: player.death_time_unix(),
        teleport_available: player.powerups.teleport_available,
        force_field_active: player.powerups.force_field_active,
        health_regen_active: player.powerups.regen_active,
    };
    if !world.send_to(&id, init) {
        return false;
    }
    for msg in world.pickup_snapshot() {
        world.send_to(&id, msg);
    }
    true
}

/// Apply one decoded client message.
pub fn handle_client_message(world: &mut World, id: PlayerId, msg: ClientMessage) -> CommandOutcome {
    let command = match msg {
        ClientMessage::Position { position } => Command::Move {
            position: position.point(),
            rotation: position.rotation,
        },
        ClientMessage::Shoot { rotation } => Command::Shoot { rotation },
        ClientMessage::Teleport { cursor_pos } => Command::Teleport { cursor: cursor_pos },
        ClientMessage::JoinMatch => {
            join_match(world, id);
            return CommandOutcome::Ignored;
        }
        ClientMessage::StartMatch => {
            start_match(world, id);
            return CommandOutcome::Ignored;
        }
    };
    apply_command(world, id, command)
}

/// Reply with `match_started` if the match is running, else the lobby roster.
pub fn join_match(world: &World, id: PlayerId) -> bool {
    let reply = if world.match_active {
        ServerMessage::MatchStarted { match_started: true }
    } else {
        ServerMessage::LobbyUpdate { lobby_update: world.connected_sessions() }
    };
    world.send_to(&id, reply)
}

/// Activate the match. Everyone hears about it the first time; later
/// requests only get a reply.
pub fn start_match(world: &mut World, id: PlayerId) {
    let msg = ServerMessage::MatchStarted { match_started: true };
    if world.match_active {
        world.send_to(&id, msg);
        return;
    }
    world.match_active = true;
    info!(player = %id, "Match started");
    world.broadcast(&msg);
}

/// Clear a player's connection if it is still `connection_id`.
///
/// Returns false when the connection was already replaced or the player is
/// gone, in which case no removal should be scheduled.
pub fn detach(world: &mut World, id: PlayerId, connection_id: ConnectionId, now: Instant) -> bool {
    let Some(player) = world.players.get_mut(&id) else {
        return false;
    };
    if player.connection.as_ref().map(Connection::id) != Some(connection_id) {
        return false;
    }
    player.connection = None;
    player.disconnected_at = Some(now);
    true
}

// =============================================================================
// SOCKET TASK
// =============================================================================

/// Read the `session_init` frame.
pub async fn read_handshake<S>(frames: &mut S) -> Result<String, SessionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match frames.next().await {
            Some(Ok(Message::Text(text))) => {
                return Handshake::from_json(&text)
                    .map(|h| h.session_id)
                    .ok_or(SessionError::InvalidHandshake);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(SessionError::HandshakeClosed),
            Some(Ok(_)) => return Err(SessionError::InvalidHandshake),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// [`read_handshake`] with a deadline.
pub async fn read_handshake_within<S>(frames: &mut S, limit: Duration) -> Result<String, SessionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    tokio::time::timeout(limit, read_handshake(frames))
        .await
        .map_err(|_| SessionError::HandshakeTimeout)?
}

/// Resolve the session to a player and send the initial sync, all under one
/// write lock.
async fn resolve_identity(
    world: &SharedWorld,
    persistence: &Persistence,
    session_id: &str,
    connection: Connection,
) -> Result<(PlayerId, bool), SessionError> {
    let mut world = world.write().await;

    if let Some(id) = world.player_by_session(session_id) {
        reattach_player(&mut world, id, connection, Instant::now());
        initial_sync(&world, id);
        return Ok((id, true));
    }

    let record = persistence.get_or_create_player(session_id).await?;
    let last_known = match persistence.get_last_known_position(session_id).await {
        Ok(position) => position,
        Err(e) => {
            warn!(session = session_id, "Last known position unavailable: {}", e);
            None
        }
    };
    let id = admit_player(&mut world, &record, last_known, connection);
    initial_sync(&world, id);
    Ok((id, false))
}

/// Drive one upgraded socket until it closes or is replaced.
#[instrument(skip(ws, world, persistence), fields(peer = %addr))]
pub async fn run_session(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    world: SharedWorld,
    persistence: Persistence,
    outbound_buffer: usize,
    handshake_timeout: Duration,
) -> Result<(), SessionError> {
    let (mut ws_sender, mut ws_receiver) = ws.split();

    let session_id = read_handshake_within(&mut ws_receiver, handshake_timeout).await?;
    let (connection, mut outbound_rx, mut kick_rx) = Connection::channel(outbound_buffer);
    let connection_id = connection.id();

    // Writer task
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let (player_id, reconnected) =
        match resolve_identity(&world, &persistence, &session_id, connection).await {
            Ok(resolved) => resolved,
            Err(e) => {
                writer.abort();
                return Err(e);
            }
        };
    if reconnected {
        info!(player = %player_id, session = %session_id, "Player reconnected");
    } else {
        info!(player = %player_id, session = %session_id, "Player joined");
    }

    // Command loop
    loop {
        tokio::select! {
            _ = &mut kick_rx => {
                debug!(player = %player_id, "Connection replaced");
                break;
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let msg = match ClientMessage::from_json(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!(player = %player_id, "Dropped malformed frame: {}", e);
                                continue;
                            }
                        };
                        let writes = {
                            let mut world = world.write().await;
                            handle_client_message(&mut world, player_id, msg);
                            world.take_store_writes()
                        };
                        persistence.dispatch(writes);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(player = %player_id, "Read failed: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Teardown
    writer.abort();
    let (detached, grace) = {
        let mut world = world.write().await;
        let grace = world.config.grace_window;
        (detach(&mut world, player_id, connection_id, Instant::now()), grace)
    };
    if detached {
        info!(player = %player_id, grace_secs = grace.as_secs_f64(), "Player disconnected");
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let writes = {
                let mut world = world.write().await;
                remove_if_abandoned(&mut world, player_id, Instant::now());
                world.take_store_writes()
            };
            persistence.dispatch(writes);
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;

    use super::*;
    use crate::game::lifecycle::kill_player;
    use crate::game::world::testing::*;

    fn frames(msgs: Vec<Message>) -> impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin {
        stream::iter(msgs.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_handshake() {
        let mut ok = frames(vec![
            Message::Ping(vec![1]),
            Message::Text(r#"{"type":"session_init","session_id":"abc"}"#.into()),
        ]);
        assert_eq!(read_handshake(&mut ok).await.unwrap(), "abc");

        let mut empty = frames(vec![Message::Text(r#"{"type":"session_init","session_id":""}"#.into())]);
        assert!(matches!(read_handshake(&mut empty).await, Err(SessionError::InvalidHandshake)));

        let mut binary = frames(vec![Message::Binary(vec![0, 1])]);
        assert!(matches!(read_handshake(&mut binary).await, Err(SessionError::InvalidHandshake)));

        let mut closed = frames(vec![]);
        assert!(matches!(read_handshake(&mut closed).await, Err(SessionError::HandshakeClosed)));
    }

    #[tokio::test]
    async fn test_handshake_deadline() {
        let mut silent = stream::pending::<Result<Message, tungstenite::Error>>();
        let result = read_handshake_within(&mut silent, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::HandshakeTimeout)));

        let mut ok = frames(vec![Message::Text(r#"{"type":"session_init","session_id":"abc"}"#.into())]);
        assert_eq!(read_handshake_within(&mut ok, Duration::from_secs(1)).await.unwrap(), "abc");
    }

    #[test]
    fn test_admit_uses_last_known_position() {
        let mut world = world();
        let (conn, mut rx, _k) = Connection::channel(16);
        let id = admit_player(&mut world, &record(1), Some(Vec2::new(42.0, 24.0)), conn);

        let p = &world.players[&id];
        assert_eq!(p.position, Vec2::new(42.0, 24.0));
        assert_eq!(p.color, session_color("session-1"));
        assert!(p.is_connected());

        assert!(initial_sync(&world, id));
        let msgs = drain(&mut rx);
        assert!(matches!(
            &msgs[0],
            ServerMessage::PlayerInit { player_id, health: 100, is_dead: false, death_time: 0, .. } if *player_id == id
        ));
    }

    #[test]
    fn test_admit_rejects_invalid_last_known() {
        let mut world = world();
        let (conn, _rx, _k) = Connection::channel(16);
        let id = admit_player(&mut world, &record(1), Some(Vec2::new(f64::NAN, 0.0)), conn);
        assert_eq!(world.players[&id].position, Vec2::new(500.0, 300.0));
    }

    #[test]
    fn test_initial_sync_includes_pickups() {
        let mut world = world();
        let now = Instant::now();
        crate::game::spawner::spawn_weapon(&mut world, now);
        crate::game::spawner::spawn_powerup(&mut world, now);

        let (conn, mut rx, _k) = Connection::channel(16);
        let id = admit_player(&mut world, &record(1), None, conn);
        initial_sync(&world, id);

        let kinds: Vec<&str> = drain(&mut rx).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["player_init", "weapon_spawn", "powerup_spawn"]);
    }

    #[test]
    fn test_reattach_kicks_stale_connection() {
        let mut world = world();
        let (a, _old_rx, mut old_kick) = join(&mut world, 1, Vec2::new(10.0, 10.0));
        let (conn, mut rx, _kick) = Connection::channel(16);
        let new_id = conn.id();

        assert!(reattach_player(&mut world, a, conn, Instant::now()));
        assert!(old_kick.try_recv().is_ok());
        assert_eq!(world.players[&a].connection.as_ref().map(Connection::id), Some(new_id));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_reattach_resets_invalid_position() {
        let mut world = world();
        let a = join_disconnected(&mut world, 1, Vec2::new(10.0, 10.0));
        world.players.get_mut(&a).unwrap().position = Vec2::new(f64::INFINITY, 0.0);
        let (conn, _rx, _k) = Connection::channel(16);
        reattach_player(&mut world, a, conn, Instant::now());
        assert_eq!(world.players[&a].position, Vec2::new(500.0, 300.0));
    }

    #[test]
    fn test_reconnect_mid_death_keeps_remaining_window() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::new(10.0, 10.0));
        kill_player(&mut world, a, t0);
        let owner = world.players[&a].connection.as_ref().unwrap().id();
        assert!(detach(&mut world, a, owner, t0));

        let (conn, mut rx, _k2) = Connection::channel(16);
        let reconnect = t0 + Duration::from_millis(1500);
        reattach_player(&mut world, a, conn, reconnect);

        let p = &world.players[&a];
        assert!(p.is_dead);
        assert_eq!(p.respawn_at, Some(reconnect + Duration::from_millis(1500)));
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind(), "player_death");
    }

    #[test]
    fn test_reconnect_after_window_respawns_immediately() {
        let mut world = world();
        let t0 = Instant::now();
        let a = join_disconnected(&mut world, 1, Vec2::new(10.0, 10.0));
        {
            let p = world.players.get_mut(&a).unwrap();
            p.is_dead = true;
            p.health = 0;
            p.died_at = Some(t0);
            p.respawn_at = Some(t0 + Duration::from_secs(3));
        }
        let (conn, mut rx, _k) = Connection::channel(16);
        reattach_player(&mut world, a, conn, t0 + Duration::from_secs(4));

        assert!(!world.players[&a].is_dead);
        let kinds: Vec<&str> = drain(&mut rx).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["player_death", "player_respawn", "player_respawn"]);
    }

    #[test]
    fn test_detach_only_owner() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::ZERO);
        let owner = world.players[&a].connection.as_ref().unwrap().id();

        assert!(!detach(&mut world, a, owner + 1000, t0));
        assert!(world.players[&a].is_connected());
        assert!(detach(&mut world, a, owner, t0));
        assert!(!world.players[&a].is_connected());
        assert_eq!(world.players[&a].disconnected_at, Some(t0));
        assert!(!detach(&mut world, PlayerId::new(99), owner, t0));
    }

    #[test]
    fn test_grace_window_reconnect_suppresses_removal() {
        let mut world = world();
        let t0 = Instant::now();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::ZERO);
        let owner = world.players[&a].connection.as_ref().unwrap().id();
        detach(&mut world, a, owner, t0);

        let (conn, _rx2, _k2) = Connection::channel(16);
        reattach_player(&mut world, a, conn, t0 + Duration::from_secs(2));

        assert!(!remove_if_abandoned(&mut world, a, t0 + Duration::from_secs(5)));
        assert!(world.players.contains_key(&a));
    }

    #[test]
    fn test_client_messages_route_to_commands() {
        let mut world = world();
        let (a, _rx, _k) = join(&mut world, 1, Vec2::ZERO);

        let msg = ClientMessage::from_json(r#"{"type":"position","position":{"x":5,"y":6,"rotation":1.0}}"#).unwrap();
        assert_eq!(handle_client_message(&mut world, a, msg), CommandOutcome::Moved);

        let msg = ClientMessage::from_json(r#"{"type":"shoot","rotation":0.5}"#).unwrap();
        assert_eq!(handle_client_message(&mut world, a, msg), CommandOutcome::Fired(1));

        let msg = ClientMessage::from_json(r#"{"type":"teleport","cursorPos":{"x":100,"y":0}}"#).unwrap();
        assert_eq!(handle_client_message(&mut world, a, msg), CommandOutcome::Ignored);
    }

    #[test]
    fn test_lobby() {
        let mut world = world();
        world.match_active = false;
        let (a, mut rx_a, _ka) = join(&mut world, 1, Vec2::ZERO);
        let (_b, mut rx_b, _kb) = join(&mut world, 2, Vec2::new(100.0, 0.0));

        handle_client_message(&mut world, a, ClientMessage::JoinMatch);
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::LobbyUpdate {
                lobby_update: vec!["session-1".to_string(), "session-2".to_string()]
            }]
        );

        handle_client_message(&mut world, a, ClientMessage::StartMatch);
        assert!(world.match_active);
        let started = ServerMessage::MatchStarted { match_started: true };
        assert_eq!(drain(&mut rx_a), vec![started.clone()]);
        assert_eq!(drain(&mut rx_b), vec![started.clone()]);

        handle_client_message(&mut world, a, ClientMessage::JoinMatch);
        assert_eq!(drain(&mut rx_a), vec![started]);
        assert!(drain(&mut rx_b).is_empty());
    }
}
