//! Fetchstate Simulation Core
//!
//! Road topology, loot spawning, pickup/dropoff resolution and the
//! per-session [`World`] tick of a multiplayer fetch game.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//!
//! Elapsed time is always passed in by the caller, and every [`World`] owns a
//! seeded RNG. Scheduling, persistence and identity belong to the server.

#![deny(unsafe_code)]

pub mod collision;
pub mod dog;
pub mod geom;
pub mod loot;
pub mod model;
pub mod road_index;
pub mod world;

use std::time::Duration;

pub use dog::{Direction, Dog, DogState, FoundObject, LostObject, PlayerRecord};
pub use geom::{Point, Point2D, Vec2D};
pub use loot::LootGenerator;
pub use model::{Game, LootGeneratorConfig, LootType, Map, MapId, ModelError, Office, Road};
pub use road_index::{RoadIndex, RoadsAtPoint};
pub use world::{RetiredDog, TickOutcome, World, WorldError, WorldSettings};

// ============================================================================
// Type Aliases
// ============================================================================

/// Dog identifier, unique and increasing within one session.
pub type DogId = u32;

/// Lost object identifier, unique and increasing within one session.
pub type LostObjectId = u32;

/// Session identifier, unique across the server.
pub type SessionId = u32;

/// Player identifier, unique across the server.
pub type PlayerId = u32;

// ============================================================================
// Movement and Gathering Constants
// ============================================================================

/// Distance a dog may stray sideways from a road's center line.
pub const HALF_ROAD_WIDTH: f64 = 0.4;

/// Pickup radius of a dog.
pub const DOG_GATHER_RADIUS: f64 = 0.3;

/// Collection radius of a lost object.
pub const LOST_OBJECT_RADIUS: f64 = 0.0;

/// Dropoff radius of an office.
pub const OFFICE_RADIUS: f64 = 0.5;

/// How far ahead a standing dog reaches.
pub const GATHER_REACH: f64 = 0.5;

pub const DEFAULT_DOG_SPEED: f64 = 1.0;

pub const DEFAULT_BAG_CAPACITY: usize = 3;

/// Idle time after which a dog leaves the game.
pub const DEFAULT_RETIREMENT_TIME: Duration = Duration::from_secs(60);
