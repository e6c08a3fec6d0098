//! Leaderboard persistence seam.

use std::sync::Mutex;

use fetchstate_sim::PlayerRecord;

use crate::error::StoreError;

/// Durable store of retired players' results.
pub trait RecordStore: Send + Sync {
    fn save(&self, records: &[PlayerRecord]) -> Result<(), StoreError>;

    /// Records ordered best first, `limit` at most, skipping `offset`.
    fn query(&self, offset: usize, limit: usize) -> Result<Vec<PlayerRecord>, StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<PlayerRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save(&self, records: &[PlayerRecord]) -> Result<(), StoreError> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("record store lock poisoned".into()))?;
        stored.extend_from_slice(records);
        // score desc, play time asc, name asc
        stored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.play_time.cmp(&b.play_time))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(())
    }

    fn query(&self, offset: usize, limit: usize) -> Result<Vec<PlayerRecord>, StoreError> {
        let stored = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("record store lock poisoned".into()))?;
        Ok(stored.iter().skip(offset).take(limit).cloned().collect())
    }
}
