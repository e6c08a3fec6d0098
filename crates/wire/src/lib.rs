//! Fetchstate Snapshot Wire Types
//!
//! Protobuf messages of the durable snapshot file and their conversions to
//! and from simulation types. The snapshot crate owns encoding, integrity and
//! validation; this crate only fixes the schema.
//!
//! # Layout
//!
//! ```text
//! SnapshotEnvelope { format_version, sha256, payload }
//!   payload = WorldSnapshotProto { sessions, next_player_id, next_session_id }
//! ```

#![deny(unsafe_code)]

use std::time::Duration;

use fetchstate_sim::{Direction, DogState, FoundObject, LostObject, Point2D, Vec2D};
use prost::Message;
use thiserror::Error;

/// Format version written into every envelope.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Errors turning wire messages back into simulation types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("{field} must have exactly 2 elements, got {len}")]
    BadVectorLength { field: &'static str, len: usize },
    #[error("unknown direction code {0}")]
    UnknownDirection(u32),
    #[error("player {0} has no dog")]
    MissingDog(u32),
}

// ============================================================================
// Envelope
// ============================================================================

/// Outer frame of a snapshot file.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotEnvelope {
    #[prost(uint32, tag = "1")]
    pub format_version: u32,

    /// SHA-256 of `payload`.
    #[prost(bytes = "vec", tag = "2")]
    pub sha256: Vec<u8>,

    /// Encoded [`WorldSnapshotProto`].
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

// ============================================================================
// World State
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct WorldSnapshotProto {
    /// Sessions ordered by session_id ascending.
    #[prost(message, repeated, tag = "1")]
    pub sessions: Vec<SessionProto>,

    #[prost(uint32, tag = "2")]
    pub next_player_id: u32,

    #[prost(uint32, tag = "3")]
    pub next_session_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SessionProto {
    #[prost(uint32, tag = "1")]
    pub session_id: u32,

    #[prost(string, tag = "2")]
    pub map_id: String,

    /// Players ordered by dog id ascending.
    #[prost(message, repeated, tag = "3")]
    pub players: Vec<PlayerProto>,

    /// Lost objects ordered by id ascending.
    #[prost(message, repeated, tag = "4")]
    pub lost_objects: Vec<LostObjectProto>,

    #[prost(uint32, tag = "5")]
    pub next_dog_id: u32,

    #[prost(uint32, tag = "6")]
    pub next_lost_object_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlayerProto {
    #[prost(uint32, tag = "1")]
    pub player_id: u32,

    /// 32 lowercase hex characters.
    #[prost(string, tag = "2")]
    pub token: String,

    #[prost(message, optional, tag = "3")]
    pub dog: Option<DogProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DogProto {
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(string, tag = "2")]
    pub name: String,

    /// [x, y]
    #[prost(double, repeated, tag = "3")]
    pub position: Vec<f64>,

    /// [x, y]
    #[prost(double, repeated, tag = "4")]
    pub speed: Vec<f64>,

    /// 0 = north, 1 = south, 2 = west, 3 = east.
    #[prost(uint32, tag = "5")]
    pub direction: u32,

    #[prost(uint32, tag = "6")]
    pub bag_capacity: u32,

    #[prost(uint64, tag = "7")]
    pub score: u64,

    #[prost(message, repeated, tag = "8")]
    pub bag: Vec<FoundObjectProto>,

    #[prost(uint64, tag = "9")]
    pub play_time_ms: u64,

    #[prost(uint64, tag = "10")]
    pub inactive_time_ms: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct FoundObjectProto {
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(uint32, tag = "2")]
    pub kind: u32,

    #[prost(uint64, tag = "3")]
    pub value: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct LostObjectProto {
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(uint32, tag = "2")]
    pub kind: u32,

    /// [x, y]
    #[prost(double, repeated, tag = "3")]
    pub position: Vec<f64>,

    #[prost(uint64, tag = "4")]
    pub value: u64,
}

// ============================================================================
// Conversion Traits
// ============================================================================

pub fn direction_to_wire(direction: Direction) -> u32 {
    match direction {
        Direction::North => 0,
        Direction::South => 1,
        Direction::West => 2,
        Direction::East => 3,
    }
}

pub fn direction_from_wire(code: u32) -> Result<Direction, ConversionError> {
    match code {
        0 => Ok(Direction::North),
        1 => Ok(Direction::South),
        2 => Ok(Direction::West),
        3 => Ok(Direction::East),
        other => Err(ConversionError::UnknownDirection(other)),
    }
}

fn pair(field: &'static str, v: &[f64]) -> Result<(f64, f64), ConversionError> {
    match v {
        [x, y] => Ok((*x, *y)),
        _ => Err(ConversionError::BadVectorLength {
            field,
            len: v.len(),
        }),
    }
}

fn to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl From<&FoundObject> for FoundObjectProto {
    fn from(f: &FoundObject) -> Self {
        Self {
            id: f.id,
            kind: f.kind as u32,
            value: f.value,
        }
    }
}

impl From<FoundObjectProto> for FoundObject {
    fn from(f: FoundObjectProto) -> Self {
        Self {
            id: f.id,
            kind: f.kind as usize,
            value: f.value,
        }
    }
}

impl From<&DogState> for DogProto {
    fn from(d: &DogState) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            position: vec![d.position.x, d.position.y],
            speed: vec![d.speed.x, d.speed.y],
            direction: direction_to_wire(d.direction),
            bag_capacity: u32::try_from(d.bag_capacity).unwrap_or(u32::MAX),
            score: d.score,
            bag: d.bag.iter().map(Into::into).collect(),
            play_time_ms: to_millis(d.play_time),
            inactive_time_ms: to_millis(d.inactive_time),
        }
    }
}

impl TryFrom<DogProto> for DogState {
    type Error = ConversionError;

    fn try_from(d: DogProto) -> Result<Self, Self::Error> {
        let (x, y) = pair("position", &d.position)?;
        let (vx, vy) = pair("speed", &d.speed)?;
        Ok(Self {
            id: d.id,
            name: d.name,
            position: Point2D::new(x, y),
            speed: Vec2D::new(vx, vy),
            direction: direction_from_wire(d.direction)?,
            bag_capacity: d.bag_capacity as usize,
            bag: d.bag.into_iter().map(Into::into).collect(),
            score: d.score,
            play_time: Duration::from_millis(d.play_time_ms),
            inactive_time: Duration::from_millis(d.inactive_time_ms),
        })
    }
}

impl From<&LostObject> for LostObjectProto {
    fn from(o: &LostObject) -> Self {
        Self {
            id: o.id,
            kind: o.kind as u32,
            position: vec![o.position.x, o.position.y],
            value: o.value,
        }
    }
}

impl TryFrom<LostObjectProto> for LostObject {
    type Error = ConversionError;

    fn try_from(o: LostObjectProto) -> Result<Self, Self::Error> {
        let (x, y) = pair("position", &o.position)?;
        Ok(Self {
            id: o.id,
            kind: o.kind as usize,
            position: Point2D::new(x, y),
            value: o.value,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dog_state() -> DogState {
        DogState {
            id: 2,
            name: "Rex".into(),
            position: Point2D::new(1.5, -0.25),
            speed: Vec2D::new(0.0, 3.0),
            direction: Direction::South,
            bag_capacity: 3,
            bag: vec![FoundObject {
                id: 7,
                kind: 1,
                value: 5,
            }],
            score: 40,
            play_time: Duration::from_millis(12_500),
            inactive_time: Duration::from_millis(1_000),
        }
    }

    #[test]
    fn test_dog_state_survives_encoding() {
        let state = dog_state();
        let bytes = DogProto::from(&state).encode_to_vec();
        let decoded = DogProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(DogState::try_from(decoded).unwrap(), state);
    }

    #[test]
    fn test_sub_millisecond_time_truncated() {
        let mut state = dog_state();
        state.play_time = Duration::from_micros(1_999);
        let proto = DogProto::from(&state);
        assert_eq!(proto.play_time_ms, 1);
    }

    #[test]
    fn test_bad_position_rejected() {
        let mut proto = DogProto::from(&dog_state());
        proto.position = vec![1.0];
        assert_eq!(
            DogState::try_from(proto),
            Err(ConversionError::BadVectorLength {
                field: "position",
                len: 1
            })
        );
    }

    #[test]
    fn test_unknown_direction_rejected() {
        let mut proto = DogProto::from(&dog_state());
        proto.direction = 9;
        assert_eq!(
            DogState::try_from(proto),
            Err(ConversionError::UnknownDirection(9))
        );
    }

    #[test]
    fn test_direction_codes_are_stable() {
        for (direction, code) in [
            (Direction::North, 0),
            (Direction::South, 1),
            (Direction::West, 2),
            (Direction::East, 3),
        ] {
            assert_eq!(direction_to_wire(direction), code);
            assert_eq!(direction_from_wire(code), Ok(direction));
        }
    }

    #[test]
    fn test_lost_object_conversion() {
        let obj = LostObject {
            id: 3,
            kind: 2,
            position: Point2D::new(4.0, 0.5),
            value: 10,
        };
        let proto = LostObjectProto::from(&obj);
        assert_eq!(proto.position, vec![4.0, 0.5]);
        assert_eq!(LostObject::try_from(proto).unwrap(), obj);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            sha256: vec![0xab; 32],
            payload: WorldSnapshotProto::default().encode_to_vec(),
        };
        let bytes = envelope.encode_to_vec();
        assert_eq!(SnapshotEnvelope::decode(bytes.as_slice()).unwrap(), envelope);
    }
}
