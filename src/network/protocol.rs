//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::entity::{EntityId, PlayerId, PowerUpType};
use crate::game::weapon::WeaponType;

/// Position as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Facing, radians.
    #[serde(default)]
    pub rotation: f64,
}

impl Position {
    /// Wire position from a point and facing.
    pub fn new(point: Vec2, rotation: f64) -> Self {
        Self { x: point.x, y: point.y, rotation }
    }

    /// Wire position with no facing.
    pub fn at(point: Vec2) -> Self {
        Self::new(point, 0.0)
    }

    /// The point, without facing.
    pub fn point(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// First frame on every connection.
///
/// Accepted from any object carrying `session_id`; the `type` field is
/// conventionally `session_init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Session identifier the client persists across reconnects.
    pub session_id: String,
}

/// Messages sent from client to server after the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client-reported position.
    Position {
        /// Reported position and facing.
        position: Position,
    },

    /// Fire the held weapon.
    Shoot {
        /// Aim, radians.
        #[serde(default)]
        rotation: f64,
    },

    /// Use the teleport ability towards the cursor.
    Teleport {
        /// Cursor position in world coordinates.
        #[serde(rename = "cursorPos", default)]
        cursor_pos: Option<Vec2>,
    },

    /// Ask whether the match is running.
    JoinMatch,

    /// Start the match if it is not running.
    StartMatch,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity and state for the connecting player.
    PlayerInit {
        /// Player id.
        player_id: PlayerId,
        /// Player colour.
        color: u32,
        /// Current position.
        position: Position,
        /// Current health.
        health: i32,
        /// Held weapon.
        weapon: WeaponType,
        /// Dead and waiting to respawn.
        is_dead: bool,
        /// Death time (unix seconds), 0 when alive.
        death_time: i64,
        /// Teleport may be used.
        #[serde(rename = "teleportAvailable")]
        teleport_available: bool,
        /// Force field is up.
        #[serde(rename = "forceFieldActive")]
        force_field_active: bool,
        /// Regen is running.
        #[serde(rename = "healthRegenActive")]
        health_regen_active: bool,
    },

    /// A player died.
    PlayerDeath {
        /// Victim.
        player_id: PlayerId,
        /// Where the victim died.
        position: Position,
        /// Death time (unix seconds).
        death_time: i64,
    },

    /// A player respawned.
    PlayerRespawn {
        /// Player.
        player_id: PlayerId,
        /// Spawn point.
        position: Position,
        /// Health after respawn.
        health: i32,
        /// Weapon after respawn.
        weapon: WeaponType,
    },

    /// A player left the world.
    PlayerDisconnect {
        /// Player.
        player_id: PlayerId,
    },

    /// A player moved.
    PositionUpdate {
        /// Player.
        player_id: PlayerId,
        /// New position.
        position: Position,
        /// Player colour.
        color: u32,
    },

    /// A player's health changed.
    HealthUpdate {
        /// Player.
        player_id: PlayerId,
        /// New health.
        health: i32,
    },

    /// A bullet moved.
    BulletUpdate {
        /// Shooter.
        player_id: PlayerId,
        /// Bullet.
        bullet_id: EntityId,
        /// Bullet position; `rotation` is the heading.
        position: Position,
    },

    /// A weapon appeared in the world.
    WeaponSpawn {
        /// Pickup id.
        weapon_id: EntityId,
        /// Position.
        position: Position,
        /// Weapon type.
        weapon: WeaponType,
    },

    /// A weapon timed out.
    WeaponDespawn {
        /// Pickup id.
        weapon_id: EntityId,
    },

    /// A player picked up a weapon.
    WeaponPickup {
        /// Player.
        player_id: PlayerId,
        /// Pickup id.
        weapon_id: EntityId,
        /// New weapon.
        weapon: WeaponType,
    },

    /// A power-up appeared in the world.
    PowerupSpawn {
        /// Pickup id.
        powerup_id: EntityId,
        /// Position.
        position: Position,
        /// Power-up type.
        powerup: PowerUpType,
    },

    /// A power-up timed out.
    PowerupDespawn {
        /// Pickup id.
        powerup_id: EntityId,
    },

    /// A player picked up a power-up.
    PowerupPickup {
        /// Player.
        player_id: PlayerId,
        /// Pickup id.
        powerup_id: EntityId,
        /// Power-up type.
        powerup: PowerUpType,
    },

    /// A player teleported.
    Teleport {
        /// Player.
        player_id: PlayerId,
        /// Destination.
        position: Position,
    },

    /// The match is running.
    MatchStarted {
        /// Always true.
        match_started: bool,
    },

    /// Waiting-room roster.
    LobbyUpdate {
        /// Session ids of connected players.
        lobby_update: Vec<String>,
    },
}

impl ServerMessage {
    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::PlayerInit { .. } => "player_init",
            ServerMessage::PlayerDeath { .. } => "player_death",
            ServerMessage::PlayerRespawn { .. } => "player_respawn",
            ServerMessage::PlayerDisconnect { .. } => "player_disconnect",
            ServerMessage::PositionUpdate { .. } => "position_update",
            ServerMessage::HealthUpdate { .. } => "health_update",
            ServerMessage::BulletUpdate { .. } => "bullet_update",
            ServerMessage::WeaponSpawn { .. } => "weapon_spawn",
            ServerMessage::WeaponDespawn { .. } => "weapon_despawn",
            ServerMessage::WeaponPickup { .. } => "weapon_pickup",
            ServerMessage::PowerupSpawn { .. } => "powerup_spawn",
            ServerMessage::PowerupDespawn { .. } => "powerup_despawn",
            ServerMessage::PowerupPickup { .. } => "powerup_pickup",
            ServerMessage::Teleport { .. } => "teleport",
            ServerMessage::MatchStarted { .. } => "match_started",
            ServerMessage::LobbyUpdate { .. } => "lobby_update",
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl Handshake {
    /// Parse and validate a handshake frame. Empty ids are rejected.
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str::<Self>(s)
            .ok()
            .filter(|h| !h.session_id.trim().is_empty())
    }
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_decode_position() {
        let msg = ClientMessage::from_json(
            r#"{"type":"position","position":{"x":12.5,"y":-3,"rotation":1.5}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Position { position } => {
                assert_eq!(position.point(), Vec2::new(12.5, -3.0));
                assert_eq!(position.rotation, 1.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_teleport_cursor() {
        let msg = ClientMessage::from_json(r#"{"type":"teleport","cursorPos":{"x":5,"y":6}}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Teleport { cursor_pos: Some(p) } if p == Vec2::new(5.0, 6.0)
        ));

        let bare = ClientMessage::from_json(r#"{"type":"teleport"}"#).unwrap();
        assert!(matches!(bare, ClientMessage::Teleport { cursor_pos: None }));
    }

    #[test]
    fn test_decode_lobby_commands() {
        assert!(matches!(ClientMessage::from_json(r#"{"type":"join_match"}"#), Ok(ClientMessage::JoinMatch)));
        assert!(matches!(ClientMessage::from_json(r#"{"type":"start_match"}"#), Ok(ClientMessage::StartMatch)));
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let msg = ClientMessage::from_json(r#"{"type":"shoot","rotation":0.5,"weapon":"pistol"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Shoot { rotation } if rotation == 0.5));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(ClientMessage::from_json("not json").is_err());
        assert!(ClientMessage::from_json(r#"{"type":"dance"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"position":{"x":1,"y":2}}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"position","position":"here"}"#).is_err());
    }

    #[test]
    fn test_handshake() {
        let h = Handshake::from_json(r#"{"type":"session_init","session_id":"abc"}"#).unwrap();
        assert_eq!(h.session_id, "abc");
        assert!(Handshake::from_json(r#"{"type":"session_init","session_id":""}"#).is_none());
        assert!(Handshake::from_json(r#"{"type":"session_init"}"#).is_none());
        assert!(Handshake::from_json("garbage").is_none());
    }

    #[test]
    fn test_player_init_field_names() {
        let msg = ServerMessage::PlayerInit {
            player_id: PlayerId::new(3),
            color: 255,
            position: Position::at(Vec2::new(500.0, 300.0)),
            health: 100,
            weapon: WeaponType::Pistol,
            is_dead: false,
            death_time: 0,
            teleport_available: true,
            force_field_active: false,
            health_regen_active: false,
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "player_init");
        assert_eq!(value["player_id"], "3");
        assert_eq!(value["weapon"], "pistol");
        assert_eq!(value["teleportAvailable"], true);
        assert_eq!(value["forceFieldActive"], false);
        assert_eq!(value["healthRegenActive"], false);
        assert_eq!(value["position"], json!({"x": 500.0, "y": 300.0, "rotation": 0.0}));
    }

    #[test]
    fn test_server_message_tags() {
        let cases = [
            (ServerMessage::HealthUpdate { player_id: PlayerId::new(1), health: 79 }, "health_update"),
            (ServerMessage::PlayerDisconnect { player_id: PlayerId::new(1) }, "player_disconnect"),
            (
                ServerMessage::PowerupDespawn { powerup_id: EntityId("p1".into()) },
                "powerup_despawn",
            ),
            (ServerMessage::MatchStarted { match_started: true }, "match_started"),
            (ServerMessage::LobbyUpdate { lobby_update: vec!["s1".into()] }, "lobby_update"),
        ];
        for (msg, tag) in cases {
            let json = msg.to_json().unwrap();
            assert!(json.contains(&format!("\"type\":\"{tag}\"")), "{json}");
            assert_eq!(msg.kind(), tag);
            assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
        }
    }
}
