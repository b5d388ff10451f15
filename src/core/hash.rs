//! Session Hashing
//!
//! Stable values derived from a session identifier with SHA-256, so a
//! returning session keeps the same colour even after its player was removed.

use sha2::{Sha256, Digest};

/// Largest colour value handed to clients (exclusive, 24-bit RGB).
pub const COLOR_LIMIT: u32 = 0xFF_FFFF;

/// Digest a session id under a domain separator.
pub fn session_digest(session_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"ARENA_TACTICS_SESSION_V1");
    hasher.update(session_id.as_bytes());
    hasher.finalize().into()
}

/// 24-bit RGB colour for a session, in `[0, 0xFFFFFF)`.
pub fn session_color(session_id: &str) -> u32 {
    let digest = session_digest(session_id);
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], 0]);
    raw % COLOR_LIMIT
}
