//! Persistence Gateway
//!
//! Narrow interface to the player store: identity lookup, stat increments,
//! position history and the last-known-position cache.
//!
//! The world is the source of truth for gameplay. Writes are queued on the
//! world as [`StoreWrite`]s while the world lock is held, then handed to
//! [`Persistence::dispatch`] which applies them on a blocking thread and
//! only logs failures.

pub mod memory;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::vec2::Vec2;
use crate::game::entity::PlayerId;

pub use memory::MemoryStore;

/// Persisted player identity and stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Store-assigned id.
    pub id: u64,
    /// Session the record is keyed by.
    pub session_id: String,
    /// Display name.
    pub username: String,
    /// Lifetime kills.
    pub kills: u32,
    /// Lifetime deaths.
    pub deaths: u32,
}

/// Player store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be used.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Position outside the valid range.
    #[error("Invalid position for session {0}")]
    InvalidPosition(String),

    /// A blocking store call panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Player store contract.
///
/// Calls are synchronous and may block; async callers go through
/// [`Persistence`].
pub trait PlayerStore: Send + Sync + 'static {
    /// Fetch the record for a session, creating it on first sight.
    fn get_or_create_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError>;

    /// Add to a session's kill and death counters. Unknown sessions are ignored.
    fn update_player_stats(&self, session_id: &str, kills: u32, deaths: u32) -> Result<(), StoreError>;

    /// Append to the position history.
    fn insert_player_position(
        &self,
        session_id: &str,
        player_id: PlayerId,
        position: Vec2,
    ) -> Result<(), StoreError>;

    /// Upsert the position a returning session spawns at.
    fn update_last_known_position(
        &self,
        session_id: &str,
        player_id: PlayerId,
        position: Vec2,
    ) -> Result<(), StoreError>;

    /// Last known position for a session, if any.
    fn get_last_known_position(&self, session_id: &str) -> Result<Option<Vec2>, StoreError>;

    /// Delete everything held for a session.
    fn remove_player(&self, session_id: &str) -> Result<(), StoreError>;
}

/// A deferred store write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Increment kill/death counters.
    UpdateStats {
        /// Session.
        session_id: String,
        /// Kills to add.
        kills: u32,
        /// Deaths to add.
        deaths: u32,
    },
    /// Log a position sample.
    InsertPosition {
        /// Session.
        session_id: String,
        /// Player.
        player_id: PlayerId,
        /// Position.
        position: Vec2,
    },
    /// Update the last known position.
    UpdateLastKnown {
        /// Session.
        session_id: String,
        /// Player.
        player_id: PlayerId,
        /// Position.
        position: Vec2,
    },
    /// Forget a session.
    RemovePlayer {
        /// Session.
        session_id: String,
    },
}

impl StoreWrite {
    /// Apply this write to a store.
    pub fn apply(&self, store: &dyn PlayerStore) -> Result<(), StoreError> {
        match self {
            StoreWrite::UpdateStats { session_id, kills, deaths } => {
                store.update_player_stats(session_id, *kills, *deaths)
            }
            StoreWrite::InsertPosition { session_id, player_id, position } => {
                store.insert_player_position(session_id, *player_id, *position)
            }
            StoreWrite::UpdateLastKnown { session_id, player_id, position } => {
                store.update_last_known_position(session_id, *player_id, *position)
            }
            StoreWrite::RemovePlayer { session_id } => store.remove_player(session_id),
        }
    }

    /// Short name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreWrite::UpdateStats { .. } => "update_stats",
            StoreWrite::InsertPosition { .. } => "insert_position",
            StoreWrite::UpdateLastKnown { .. } => "update_last_known",
            StoreWrite::RemovePlayer { .. } => "remove_player",
        }
    }
}

/// Async front for a [`PlayerStore`].
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn PlayerStore>,
}

impl Persistence {
    /// Wrap a store.
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self { store }
    }

    /// Fetch or create the record for a session.
    pub async fn get_or_create_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError> {
        let store = self.store.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || store.get_or_create_player(&session_id)).await?
    }

    /// Last known position for a session.
    pub async fn get_last_known_position(&self, session_id: &str) -> Result<Option<Vec2>, StoreError> {
        let store = self.store.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || store.get_last_known_position(&session_id)).await?
    }

    /// Apply `writes` in order on a detached blocking task.
    ///
    /// Failures are logged and skipped. Returns `None` when there is
    /// nothing to do.
    pub fn dispatch(&self, writes: Vec<StoreWrite>) -> Option<JoinHandle<()>> {
        if writes.is_empty() {
            return None;
        }
        let store = self.store.clone();
        Some(tokio::task::spawn_blocking(move || {
            for write in &writes {
                match write.apply(store.as_ref()) {
                    Ok(()) => debug!(kind = write.kind(), "Store write applied"),
                    Err(e) => warn!(kind = write.kind(), "Store write failed: {}", e),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_applies_in_order() {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone());

        let record = persistence.get_or_create_player("session-a").await.unwrap();
        let handle = persistence
            .dispatch(vec![
                StoreWrite::UpdateStats { session_id: "session-a".into(), kills: 1, deaths: 0 },
                StoreWrite::UpdateStats { session_id: "session-a".into(), kills: 1, deaths: 2 },
                StoreWrite::UpdateLastKnown {
                    session_id: "session-a".into(),
                    player_id: PlayerId::new(record.id),
                    position: Vec2::new(10.0, 20.0),
                },
            ])
            .unwrap();
        handle.await.unwrap();

        let record = store.get_or_create_player("session-a").unwrap();
        assert_eq!(record.kills, 2);
        assert_eq!(record.deaths, 2);
        assert_eq!(
            persistence.get_last_known_position("session-a").await.unwrap(),
            Some(Vec2::new(10.0, 20.0))
        );
    }

    #[tokio::test]
    async fn test_dispatch_survives_failures() {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone());
        let record = persistence.get_or_create_player("session-b").await.unwrap();

        let handle = persistence
            .dispatch(vec![
                StoreWrite::InsertPosition {
                    session_id: "session-b".into(),
                    player_id: PlayerId::new(record.id),
                    position: Vec2::new(f64::NAN, 0.0),
                },
                StoreWrite::UpdateStats { session_id: "session-b".into(), kills: 3, deaths: 0 },
            ])
            .unwrap();
        handle.await.unwrap();

        assert_eq!(store.get_or_create_player("session-b").unwrap().kills, 3);
    }

    #[test]
    fn test_dispatch_nothing() {
        let persistence = Persistence::new(Arc::new(MemoryStore::new()));
        assert!(persistence.dispatch(Vec::new()).is_none());
    }
}
