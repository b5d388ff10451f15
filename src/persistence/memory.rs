//! In-Memory Player Store
//!
//! [`PlayerStore`] backed by process memory. Position history is a bounded
//! ring; the oldest samples are discarded first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use chrono::{DateTime, Utc};

use crate::core::vec2::Vec2;
use crate::game::entity::PlayerId;
use super::{PlayerRecord, PlayerStore, StoreError};

/// Default position-history capacity.
pub const DEFAULT_HISTORY: usize = 100_000;

/// One logged position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    /// Session.
    pub session_id: String,
    /// Player.
    pub player_id: PlayerId,
    /// Position.
    pub position: Vec2,
    /// When it was recorded.
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    players: BTreeMap<String, PlayerRecord>,
    last_positions: BTreeMap<String, (PlayerId, Vec2, DateTime<Utc>)>,
    positions: VecDeque<PositionSample>,
}

/// In-memory player store.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    history: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with the default history capacity.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Store keeping at most `history` position samples.
    pub fn with_history(history: usize) -> Self {
        Self {
            tables: Mutex::new(Tables { next_id: 1, ..Default::default() }),
            history,
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("player tables poisoned".to_string()))
    }

    /// Logged positions for a session, oldest first.
    pub fn position_history(&self, session_id: &str) -> Result<Vec<PositionSample>, StoreError> {
        Ok(self
            .tables()?
            .positions
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect())
    }

    /// Number of known sessions.
    pub fn player_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.players.len())
    }
}

/// Display name for a new session: `Player_` plus the first eight characters.
pub fn default_username(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(8).collect();
    format!("Player_{prefix}")
}

fn check_position(session_id: &str, position: Vec2) -> Result<(), StoreError> {
    if position.is_valid_position() {
        Ok(())
    } else {
        Err(StoreError::InvalidPosition(session_id.to_string()))
    }
}

impl PlayerStore for MemoryStore {
    fn get_or_create_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError> {
        let mut tables = self.tables()?;
        if let Some(record) = tables.players.get(session_id) {
            return Ok(record.clone());
        }

        let id = tables.next_id;
        tables.next_id += 1;
        let record = PlayerRecord {
            id,
            session_id: session_id.to_string(),
            username: default_username(session_id),
            kills: 0,
            deaths: 0,
        };
        tables.players.insert(session_id.to_string(), record.clone());
        Ok(record)
    }

    fn update_player_stats(&self, session_id: &str, kills: u32, deaths: u32) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if let Some(record) = tables.players.get_mut(session_id) {
            record.kills = record.kills.saturating_add(kills);
            record.deaths = record.deaths.saturating_add(deaths);
        }
        Ok(())
    }

    fn insert_player_position(
        &self,
        session_id: &str,
        player_id: PlayerId,
        position: Vec2,
    ) -> Result<(), StoreError> {
        check_position(session_id, position)?;
        let mut tables = self.tables()?;
        if self.history == 0 {
            return Ok(());
        }
        while tables.positions.len() >= self.history {
            tables.positions.pop_front();
        }
        tables.positions.push_back(PositionSample {
            session_id: session_id.to_string(),
            player_id,
            position,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    fn update_last_known_position(
        &self,
        session_id: &str,
        player_id: PlayerId,
        position: Vec2,
    ) -> Result<(), StoreError> {
        check_position(session_id, position)?;
        self.tables()?
            .last_positions
            .insert(session_id.to_string(), (player_id, position, Utc::now()));
        Ok(())
    }

    fn get_last_known_position(&self, session_id: &str) -> Result<Option<Vec2>, StoreError> {
        Ok(self.tables()?.last_positions.get(session_id).map(|(_, pos, _)| *pos))
    }

    fn remove_player(&self, session_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables.players.remove(session_id);
        tables.last_positions.remove(session_id);
        tables.positions.retain(|s| s.session_id != session_id);
        Ok(())
    }
}
