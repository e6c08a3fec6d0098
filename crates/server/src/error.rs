//! Server error types.

use std::time::Duration;

use fetchstate_sim::{MapId, SessionId, WorldError};
use fetchstate_snapshot::SnapshotError;
use thiserror::Error;

use crate::players::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroPeriod { name: &'static str },
    #[error("records limit must be greater than zero")]
    ZeroRecordsLimit,
    #[error("save_state_period requires state_file")]
    SavePeriodWithoutStateFile,
}

impl ConfigError {
    pub(crate) fn check_period(name: &'static str, period: Option<Duration>) -> Result<(), Self> {
        match period {
            Some(p) if p.is_zero() => Err(Self::ZeroPeriod { name }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("player name must not be empty")]
    EmptyName,
    #[error("map {0} not found")]
    UnknownMap(MapId),
    #[error("player token has not been found")]
    UnknownToken,
    #[error("invalid move {0:?}")]
    MalformedMove(String),
    #[error("records limit {limit} exceeds {max}")]
    BadRecordsLimit { limit: usize, max: usize },
    #[error("session {0} is no longer running")]
    SessionClosed(SessionId),
    #[error("session {0} collides with a live session")]
    SessionConflict(SessionId),
    #[error("state can only be restored before any session starts")]
    AlreadyRunning,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
