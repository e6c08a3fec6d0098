//! Fetchstate World Snapshots
//!
//! Captures the live state of every session into a [`WorldRecord`], encodes
//! it behind a SHA-256 integrity digest, and validates a decoded record in
//! full before anything is rebuilt from it.
//!
//! # Architecture
//!
//! - [`SessionRecord::capture`]: world → record, inside the session's task
//! - [`encode`] / [`decode`]: record ↔ enveloped bytes
//! - [`write_snapshot`] / [`read_snapshot`]: atomic file I/O
//! - [`SessionRecord::build_world`]: record → fresh [`World`]

#![deny(unsafe_code)]

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fetchstate_sim::{
    DogId, DogState, LostObject, LostObjectId, Map, MapId, PlayerId, SessionId, World,
    WorldError, WorldSettings,
};
use fetchstate_wire::{
    ConversionError, DogProto, LostObjectProto, PlayerProto, SNAPSHOT_FORMAT_VERSION,
    SessionProto, SnapshotEnvelope, WorldSnapshotProto,
};
use prost::Message;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a rendered player token.
pub const TOKEN_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot digest does not match its payload")]
    ChecksumMismatch,
    #[error("invalid snapshot field: {0}")]
    Conversion(#[from] ConversionError),
    #[error("invalid snapshot: {reason}")]
    Invalid { reason: String },
    #[error("cannot rebuild session: {0}")]
    World(#[from] WorldError),
}

fn invalid(reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Invalid {
        reason: reason.into(),
    }
}

// ============================================================================
// Records
// ============================================================================

/// A dog together with the identity bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub player_id: PlayerId,
    pub token: String,
    pub dog: DogState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub map_id: MapId,
    /// Ordered by dog id ascending.
    pub players: Vec<PlayerEntry>,
    /// Ordered by id ascending.
    pub lost_objects: Vec<LostObject>,
    pub next_dog_id: DogId,
    pub next_lost_object_id: LostObjectId,
}

impl SessionRecord {
    /// Record the state of `world`.
    ///
    /// `binding` resolves a dog to its player id and token; dogs without a
    /// binding are left out.
    pub fn capture(
        world: &World,
        mut binding: impl FnMut(DogId) -> Option<(PlayerId, String)>,
    ) -> Self {
        let players = world
            .dogs()
            .filter_map(|dog| {
                binding(dog.id()).map(|(player_id, token)| PlayerEntry {
                    player_id,
                    token,
                    dog: dog.state().clone(),
                })
            })
            .collect();

        Self {
            session_id: world.id(),
            map_id: world.map().id().clone(),
            players,
            lost_objects: world.lost_objects().cloned().collect(),
            next_dog_id: world.next_dog_id(),
            next_lost_object_id: world.next_lost_object_id(),
        }
    }

    /// Rebuild a world for this record on `map`.
    ///
    /// Id counters end up past every restored id even when the stored
    /// counters lag behind.
    pub fn build_world(&self, map: Arc<Map>, settings: WorldSettings) -> Result<World, WorldError> {
        let mut world = World::new(self.session_id, map, settings);
        for entry in &self.players {
            world.restore_dog(entry.dog.clone())?;
        }
        for obj in &self.lost_objects {
            world.restore_lost_object(obj.clone())?;
        }
        world.reserve_ids(self.next_dog_id, self.next_lost_object_id);
        Ok(world)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldRecord {
    /// Ordered by session id ascending.
    pub sessions: Vec<SessionRecord>,
    pub next_player_id: PlayerId,
    pub next_session_id: SessionId,
}

// ============================================================================
// Validation
// ============================================================================

/// Whether `token` is 32 lowercase hex characters.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn strictly_ascending<T: PartialOrd + Copy>(ids: impl IntoIterator<Item = T>) -> bool {
    let mut prev: Option<T> = None;
    for id in ids {
        if prev.is_some_and(|p| p >= id) {
            return false;
        }
        prev = Some(id);
    }
    true
}

/// Ids and counters must leave room for one more allocation.
fn check_id(what: &str, id: u32) -> Result<(), SnapshotError> {
    if id == u32::MAX {
        return Err(invalid(format!("{what} {id} exhausts the id space")));
    }
    Ok(())
}

/// Check everything a restore relies on, without touching any live state.
pub fn validate(record: &WorldRecord) -> Result<(), SnapshotError> {
    if !strictly_ascending(record.sessions.iter().map(|s| s.session_id)) {
        return Err(invalid("session ids must be unique and ascending"));
    }
    check_id("next player id", record.next_player_id)?;
    check_id("next session id", record.next_session_id)?;

    let mut maps = HashSet::new();
    let mut player_ids = HashSet::new();
    let mut tokens = HashSet::new();

    for session in &record.sessions {
        let sid = session.session_id;
        check_id("session id", sid)?;
        check_id("next dog id", session.next_dog_id)?;
        check_id("next lost object id", session.next_lost_object_id)?;
        for obj in &session.lost_objects {
            check_id("lost object id", obj.id)?;
        }
        if !maps.insert(&session.map_id) {
            return Err(invalid(format!(
                "map {} has more than one session",
                session.map_id
            )));
        }
        if !strictly_ascending(session.players.iter().map(|p| p.dog.id)) {
            return Err(invalid(format!(
                "session {sid}: dog ids must be unique and ascending"
            )));
        }
        if !strictly_ascending(session.lost_objects.iter().map(|o| o.id)) {
            return Err(invalid(format!(
                "session {sid}: lost object ids must be unique and ascending"
            )));
        }

        for entry in &session.players {
            let dog = &entry.dog;
            check_id("player id", entry.player_id)?;
            check_id("dog id", dog.id)?;
            for item in &dog.bag {
                check_id("bagged object id", item.id)?;
            }
            if dog.bag.len() > dog.bag_capacity {
                return Err(invalid(format!(
                    "session {sid}: dog {} carries {} items, capacity is {}",
                    dog.id,
                    dog.bag.len(),
                    dog.bag_capacity
                )));
            }
            if !player_ids.insert(entry.player_id) {
                return Err(invalid(format!("duplicate player id {}", entry.player_id)));
            }
            if !is_valid_token(&entry.token) {
                return Err(invalid(format!(
                    "player {}: malformed token",
                    entry.player_id
                )));
            }
            if !tokens.insert(entry.token.as_str()) {
                return Err(invalid(format!(
                    "player {}: token already in use",
                    entry.player_id
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Codec
// ============================================================================

fn to_proto(record: &WorldRecord) -> WorldSnapshotProto {
    WorldSnapshotProto {
        sessions: record
            .sessions
            .iter()
            .map(|s| SessionProto {
                session_id: s.session_id,
                map_id: s.map_id.as_str().to_string(),
                players: s
                    .players
                    .iter()
                    .map(|p| PlayerProto {
                        player_id: p.player_id,
                        token: p.token.clone(),
                        dog: Some(DogProto::from(&p.dog)),
                    })
                    .collect(),
                lost_objects: s.lost_objects.iter().map(LostObjectProto::from).collect(),
                next_dog_id: s.next_dog_id,
                next_lost_object_id: s.next_lost_object_id,
            })
            .collect(),
        next_player_id: record.next_player_id,
        next_session_id: record.next_session_id,
    }
}

fn from_proto(proto: WorldSnapshotProto) -> Result<WorldRecord, SnapshotError> {
    let mut sessions = Vec::with_capacity(proto.sessions.len());
    for s in proto.sessions {
        let mut players = Vec::with_capacity(s.players.len());
        for p in s.players {
            let dog = p.dog.ok_or(ConversionError::MissingDog(p.player_id))?;
            players.push(PlayerEntry {
                player_id: p.player_id,
                token: p.token,
                dog: DogState::try_from(dog)?,
            });
        }
        let lost_objects = s
            .lost_objects
            .into_iter()
            .map(LostObject::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        sessions.push(SessionRecord {
            session_id: s.session_id,
            map_id: MapId::new(s.map_id),
            players,
            lost_objects,
            next_dog_id: s.next_dog_id,
            next_lost_object_id: s.next_lost_object_id,
        });
    }
    Ok(WorldRecord {
        sessions,
        next_player_id: proto.next_player_id,
        next_session_id: proto.next_session_id,
    })
}

/// Encode `record` into an enveloped, digest-protected byte buffer.
pub fn encode(record: &WorldRecord) -> Vec<u8> {
    let payload = to_proto(record).encode_to_vec();
    let sha256 = Sha256::digest(&payload).to_vec();
    SnapshotEnvelope {
        format_version: SNAPSHOT_FORMAT_VERSION,
        sha256,
        payload,
    }
    .encode_to_vec()
}

/// Decode and fully validate an enveloped snapshot.
pub fn decode(bytes: &[u8]) -> Result<WorldRecord, SnapshotError> {
    let envelope = SnapshotEnvelope::decode(bytes)?;
    if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(envelope.format_version));
    }
    if Sha256::digest(&envelope.payload).as_slice() != envelope.sha256.as_slice() {
        return Err(SnapshotError::ChecksumMismatch);
    }

    let proto = WorldSnapshotProto::decode(envelope.payload.as_slice())?;
    let record = from_proto(proto)?;
    validate(&record)?;
    Ok(record)
}

// ============================================================================
// Snapshot I/O
// ============================================================================

/// Write `record` to `path`, replacing any previous snapshot.
///
/// Bytes go to a sibling temp file first, so a crash mid-write leaves the
/// previous snapshot intact.
pub fn write_snapshot(path: &Path, record: &WorldRecord) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, encode(record))?;
    replace_file(&tmp_path, path)?;
    Ok(())
}

/// Read and validate the snapshot at `path`.
pub fn read_snapshot(path: &Path) -> Result<WorldRecord, SnapshotError> {
    let data = fs::read(path)?;
    decode(&data)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("snapshot");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

// ============================================================================
// Tests
// ============================================================================
