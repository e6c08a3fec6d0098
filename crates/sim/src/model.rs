//! Static map templates.
//!
//! A [`Map`] is assembled once by an external loader and then shared (behind
//! an `Arc`) by every session playing it. Nothing here changes after
//! [`Game::add_map`].

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;

use crate::geom::{Coord, Offset, Point, Point2D, Rectangle};
use crate::road_index::RoadIndex;
use crate::{DEFAULT_BAG_CAPACITY, DEFAULT_DOG_SPEED, DEFAULT_RETIREMENT_TIME, OFFICE_RADIUS};

/// Errors raised while assembling maps. All of them are fatal to the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("map with id {0} already exists")]
    DuplicateMap(MapId),
    #[error("duplicate office {office} on map {map}")]
    DuplicateOffice { map: MapId, office: String },
    #[error("map {0} has no roads")]
    NoRoads(MapId),
}

/// Map identifier as declared by the map config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(String);

impl MapId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MapId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Roads
// ============================================================================

/// Axis a road runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Straight axis-aligned road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Road {
    start: Point,
    end: Point,
}

impl Road {
    /// Road from `start` to `(end_x, start.y)`.
    pub fn horizontal(start: Point, end_x: Coord) -> Self {
        Self {
            start,
            end: Point::new(end_x, start.y),
        }
    }

    /// Road from `start` to `(start.x, end_y)`.
    pub fn vertical(start: Point, end_y: Coord) -> Self {
        Self {
            start,
            end: Point::new(start.x, end_y),
        }
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    /// A zero-length road counts as horizontal.
    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        !self.is_horizontal()
    }

    pub fn orientation(&self) -> Orientation {
        if self.is_horizontal() {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    /// Same road with the smaller coordinate first.
    pub fn normalized(&self) -> Self {
        let mut road = *self;
        if road.is_horizontal() {
            if road.start.x > road.end.x {
                std::mem::swap(&mut road.start.x, &mut road.end.x);
            }
        } else if road.start.y > road.end.y {
            std::mem::swap(&mut road.start.y, &mut road.end.y);
        }
        road
    }
}

/// Decorative building; not simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Building {
    pub bounds: Rectangle,
}

/// Dropoff point. Acts as a gather target with [`OFFICE_RADIUS`].
#[derive(Debug, Clone, PartialEq)]
pub struct Office {
    id: String,
    position: Point,
    offset: Offset,
}

impl Office {
    pub fn new(id: impl Into<String>, position: Point, offset: Offset) -> Self {
        Self {
            id: id.into(),
            position,
            offset,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> Point2D {
        self.position.into()
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn radius(&self) -> f64 {
        OFFICE_RADIUS
    }
}

/// Entry of a map's loot table. Only `value` matters to the simulation; the
/// rest is presentation data passed through to clients.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LootType {
    pub name: String,
    pub file: String,
    pub kind: String,
    pub rotation: Option<i32>,
    pub color: Option<String>,
    pub scale: f64,
    pub value: u64,
}

// ============================================================================
// Map
// ============================================================================

/// Immutable map template.
#[derive(Debug)]
pub struct Map {
    id: MapId,
    name: String,
    dog_speed: f64,
    bag_capacity: usize,
    roads: Vec<Road>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    loot_types: Vec<LootType>,
    road_index: OnceLock<RoadIndex>,
}

impl Map {
    pub fn new(id: MapId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            dog_speed: DEFAULT_DOG_SPEED,
            bag_capacity: DEFAULT_BAG_CAPACITY,
            roads: Vec::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            loot_types: Vec::new(),
            road_index: OnceLock::new(),
        }
    }

    pub fn with_dog_speed(mut self, dog_speed: f64) -> Self {
        self.dog_speed = dog_speed;
        self
    }

    pub fn with_bag_capacity(mut self, bag_capacity: usize) -> Self {
        self.bag_capacity = bag_capacity;
        self
    }

    pub fn add_road(&mut self, road: Road) {
        self.roads.push(road);
        // Adding roads after a query would leave a stale index.
        self.road_index = OnceLock::new();
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn add_office(&mut self, office: Office) -> Result<(), ModelError> {
        if self.offices.iter().any(|o| o.id == office.id) {
            return Err(ModelError::DuplicateOffice {
                map: self.id.clone(),
                office: office.id,
            });
        }
        self.offices.push(office);
        Ok(())
    }

    pub fn add_loot_type(&mut self, loot_type: LootType) {
        self.loot_types.push(loot_type);
    }

    pub fn id(&self) -> &MapId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dog_speed(&self) -> f64 {
        self.dog_speed
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag_capacity
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn loot_types(&self) -> &[LootType] {
        &self.loot_types
    }

    /// Point value of loot type `index`, if the table has it.
    pub fn loot_value(&self, index: usize) -> Option<u64> {
        self.loot_types.get(index).map(|t| t.value)
    }

    /// Road index over this map's roads, built on first use.
    pub fn road_index(&self) -> &RoadIndex {
        self.road_index.get_or_init(|| RoadIndex::new(&self.roads))
    }

    /// Canonical spawn point: the start of the first declared road.
    pub fn default_spawn(&self) -> Option<Point2D> {
        self.roads.first().map(|r| r.start().into())
    }
}

// ============================================================================
// Game
// ============================================================================

/// Loot generator tuning, shared by every map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LootGeneratorConfig {
    pub period: Duration,
    pub probability: f64,
}

impl Default for LootGeneratorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            probability: 0.5,
        }
    }
}

/// Catalog of all maps plus the game-wide tuning.
#[derive(Debug, Default)]
pub struct Game {
    maps: Vec<Arc<Map>>,
    ids: HashSet<MapId>,
    loot_generator: LootGeneratorConfig,
    dog_retirement_time: Option<Duration>,
}

impl Game {
    pub fn new(loot_generator: LootGeneratorConfig) -> Self {
        Self {
            loot_generator,
            ..Default::default()
        }
    }

    pub fn with_dog_retirement_time(mut self, retirement: Duration) -> Self {
        self.dog_retirement_time = Some(retirement);
        self
    }

    pub fn add_map(&mut self, map: Map) -> Result<(), ModelError> {
        if map.roads.is_empty() {
            return Err(ModelError::NoRoads(map.id));
        }
        if !self.ids.insert(map.id.clone()) {
            return Err(ModelError::DuplicateMap(map.id));
        }
        self.maps.push(Arc::new(map));
        Ok(())
    }

    pub fn maps(&self) -> &[Arc<Map>] {
        &self.maps
    }

    pub fn find_map(&self, id: &MapId) -> Option<&Arc<Map>> {
        self.maps.iter().find(|m| &m.id == id)
    }

    pub fn loot_generator(&self) -> LootGeneratorConfig {
        self.loot_generator
    }

    pub fn dog_retirement_time(&self) -> Duration {
        self.dog_retirement_time.unwrap_or(DEFAULT_RETIREMENT_TIME)
    }
}
