//! Fetchstate Server Edge
//!
//! The Server Edge hosts the live sessions of a [`Game`] and serves the
//! player-facing use cases. It owns:
//! - Session strands and their periodic activities
//! - Player ids and bearer tokens
//! - The session directory and its event pump
//! - Leaderboard hand-off and world snapshots
//!
//! # Architecture
//!
//! Each session's [`World`](fetchstate_sim::World) lives inside its own tokio
//! task and is only ever touched there. Everything else addresses sessions,
//! dogs and players by id.

#![deny(unsafe_code)]

pub mod app;
pub mod directory;
pub mod error;
pub mod players;
pub mod records;
pub mod session;
pub mod ticker;
pub mod view;

use std::path::PathBuf;
use std::time::Duration;

pub use app::Application;
pub use error::{AppError, ConfigError, StoreError};
pub use fetchstate_sim::Game;
pub use players::{Player, PlayerRegistry, Token, TokenRegistry};
pub use records::{InMemoryRecordStore, RecordStore};
pub use view::{GameState, JoinResult, LostObjectView, MapInfo, MoveCommand, PlayerInfo, PlayerView};

// ============================================================================
// Parameters
// ============================================================================

/// Largest leaderboard page a client may request.
pub const RECORDS_LIMIT: usize = 100;

// ============================================================================
// Server Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Advance sessions on this period. Without it, time only moves through
    /// [`Application::tick`].
    pub tick_period: Option<Duration>,
    pub randomize_spawn_points: bool,
    /// Snapshot file for save and restore.
    pub state_file: Option<PathBuf>,
    pub save_state_period: Option<Duration>,
    /// Base seed of the per-session RNGs; fresh entropy when absent.
    pub seed: Option<u64>,
    pub records_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_period: None,
            randomize_spawn_points: false,
            state_file: None,
            save_state_period: None,
            seed: None,
            records_limit: RECORDS_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_period("tick_period", self.tick_period)?;
        ConfigError::check_period("save_state_period", self.save_state_period)?;
        if self.records_limit == 0 {
            return Err(ConfigError::ZeroRecordsLimit);
        }
        if self.save_state_period.is_some() && self.state_file.is_none() {
            return Err(ConfigError::SavePeriodWithoutStateFile);
        }
        Ok(())
    }
}
