//! Core primitives.
//!
//! Geometry, randomness and hashing shared by the game and network layers.

pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use rng::GameRng;
pub use hash::session_color;
