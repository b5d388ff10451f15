//! Network Layer
//!
//! WebSocket server, per-socket sessions and the JSON wire protocol.
//! Gameplay rules live in `game/`; this layer decodes, routes and sends.

pub mod connection;
pub mod protocol;
pub mod session;
pub mod server;

pub use connection::{Connection, ConnectionId};
pub use protocol::{ClientMessage, Handshake, Position, ServerMessage};
pub use session::{run_session, SessionError};
pub use server::{GameServer, GameServerError, ServerConfig};
