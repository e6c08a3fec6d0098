//! Session directory: which session plays which map.

use std::collections::{BTreeMap, HashMap};

use fetchstate_sim::{MapId, RetiredDog, SessionId};
use tokio::sync::oneshot;

use crate::session::{SessionHandle, Strand};

/// Notifications from session strands to the directory pump.
#[derive(Debug)]
pub enum DirectoryEvent {
    PlayersFinished {
        session_id: SessionId,
        retired: Vec<RetiredDog>,
    },
    /// The session's last dog just left.
    SessionEmptied { session_id: SessionId },
    /// Acknowledged once every earlier event has been handled.
    Flush(oneshot::Sender<()>),
}

/// At most one live session per map.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: BTreeMap<SessionId, SessionHandle>,
    by_map: HashMap<MapId, SessionId>,
    next_session_id: SessionId,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;
        id
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id
    }

    /// Never lowers the counter.
    pub fn reserve(&mut self, next_session_id: SessionId) {
        self.next_session_id = self.next_session_id.max(next_session_id);
    }

    /// Register `handle`. Returns it back if its id or map is taken, or if
    /// no id is left after it.
    pub fn insert(&mut self, handle: SessionHandle) -> Result<(), SessionHandle> {
        if self.sessions.contains_key(&handle.id()) || self.by_map.contains_key(handle.map_id()) {
            return Err(handle);
        }
        let Some(next_id) = handle.id().checked_add(1) else {
            return Err(handle);
        };
        self.next_session_id = self.next_session_id.max(next_id);
        self.by_map.insert(handle.map_id().clone(), handle.id());
        self.sessions.insert(handle.id(), handle);
        Ok(())
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionHandle> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionHandle> {
        self.sessions.get_mut(&id)
    }

    pub fn find_by_map(&self, map_id: &MapId) -> Option<&SessionHandle> {
        self.by_map.get(map_id).and_then(|id| self.sessions.get(id))
    }

    pub fn remove(&mut self, id: SessionId) -> Option<SessionHandle> {
        let handle = self.sessions.remove(&id)?;
        self.by_map.remove(handle.map_id());
        Some(handle)
    }

    /// Live sessions in ascending id order.
    pub fn handles(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.values()
    }

    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut SessionHandle> {
        self.sessions.values_mut()
    }

    pub fn strands(&self) -> Vec<Strand> {
        self.sessions.values().map(|h| h.strand().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use fetchstate_sim::{LootGeneratorConfig, Map, Point, Road, World, WorldSettings};
    use tokio::sync::mpsc;

    fn handle(id: SessionId, map: &str) -> SessionHandle {
        let mut m = Map::new(MapId::new(map), map);
        m.add_road(Road::horizontal(Point::new(0, 0), 1));
        let world = World::new(
            id,
            Arc::new(m),
            WorldSettings {
                loot: LootGeneratorConfig::default(),
                retirement_time: Duration::from_secs(60),
                seed: 0,
            },
        );
        let (events, _rx) = mpsc::unbounded_channel();
        SessionHandle::spawn(world, events)
    }

    #[tokio::test]
    async fn test_one_session_per_map() {
        let mut directory = SessionDirectory::new();
        let a = directory.allocate_id();
        let b = directory.allocate_id();
        assert_eq!((a, b), (0, 1));

        directory.insert(handle(a, "town")).unwrap();
        assert!(directory.insert(handle(b, "town")).is_err());
        directory.insert(handle(b, "city")).unwrap();

        assert_eq!(directory.find_by_map(&MapId::new("town")).unwrap().id(), a);
        assert_eq!(directory.find_by_map(&MapId::new("city")).unwrap().id(), b);
        assert_eq!(directory.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_frees_map() {
        let mut directory = SessionDirectory::new();
        let id = directory.allocate_id();
        directory.insert(handle(id, "town")).unwrap();
        assert!(directory.remove(id).is_some());
        assert!(directory.find_by_map(&MapId::new("town")).is_none());
        assert!(directory.is_empty());

        // ids are not reused after removal
        assert_eq!(directory.allocate_id(), 1);
    }

    #[tokio::test]
    async fn test_insert_restored_id_bumps_counter() {
        let mut directory = SessionDirectory::new();
        directory.insert(handle(7, "town")).unwrap();
        assert_eq!(directory.allocate_id(), 8);
        directory.reserve(3);
        assert_eq!(directory.next_session_id(), 9);
    }

    #[tokio::test]
    async fn test_last_session_id_rejected() {
        let mut directory = SessionDirectory::new();
        assert!(directory.insert(handle(u32::MAX, "town")).is_err());
        assert!(directory.is_empty());
        assert_eq!(directory.next_session_id(), 0);
    }
}
