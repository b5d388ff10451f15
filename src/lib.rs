//! # Arena Tactics Game Server
//!
//! Authoritative real-time server for a top-down arena shooter. Clients
//! report positions and fire commands over WebSocket; the server owns the
//! world, resolves combat at 60 Hz and streams the results back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ARENA TACTICS SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D vector and position validity           │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - Session colour derivation                 │
//! │                                                              │
//! │  game/           - Game logic (runs under the world lock)    │
//! │  ├── world.rs    - Shared entity store and broadcast         │
//! │  ├── entity.rs   - Players, bullets, pickups                 │
//! │  ├── weapon.rs   - Ballistic profiles                        │
//! │  ├── command.rs  - Move / shoot / teleport                   │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  ├── collision.rs- Radius checks and separation              │
//! │  ├── lifecycle.rs- Death, respawn, removal                   │
//! │  └── spawner.rs  - Weapon and power-up spawning              │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - Listener and background loops             │
//! │  ├── session.rs  - Per-socket session task                   │
//! │  ├── connection.rs - Outbound queue per socket               │
//! │  └── protocol.rs - JSON message types                        │
//! │                                                              │
//! │  persistence/    - Player store (best effort)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! One `tokio::sync::RwLock` guards the whole [`game::World`]. A tick, a
//! client command and a spawn each run as one critical section, so nothing
//! observes a half-applied update. Store writes are queued inside the
//! critical section and applied afterwards on a blocking thread; the world
//! never waits on them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::vec2::Vec2;
pub use crate::core::rng::GameRng;
pub use game::{MatchConfig, PlayerId, SharedWorld, World};
pub use network::{GameServer, ServerConfig};
pub use persistence::{MemoryStore, Persistence, PlayerStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
