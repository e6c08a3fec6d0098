//! Dog actors and the items they carry.

use std::time::Duration;

use crate::geom::{Point2D, Vec2D};
use crate::road_index::RoadIndex;
use crate::{DogId, GATHER_REACH, HALF_ROAD_WIDTH, LostObjectId};

// ============================================================================
// Direction
// ============================================================================

/// Facing direction. Screen coordinates: north is negative y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    North,
    South,
    West,
    East,
}

impl Direction {
    /// Unit vector pointing the way the dog faces.
    pub fn unit(self) -> Vec2D {
        match self {
            Direction::North => Vec2D::new(0.0, -1.0),
            Direction::South => Vec2D::new(0.0, 1.0),
            Direction::West => Vec2D::new(-1.0, 0.0),
            Direction::East => Vec2D::new(1.0, 0.0),
        }
    }

    /// Velocity of a dog heading this way at `speed`.
    pub fn velocity(self, speed: f64) -> Vec2D {
        self.unit() * speed
    }

    /// Single-letter client code.
    pub fn code(self) -> &'static str {
        match self {
            Direction::North => "U",
            Direction::South => "D",
            Direction::West => "L",
            Direction::East => "R",
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// Loot lying on a road, waiting to be picked up.
#[derive(Debug, Clone, PartialEq)]
pub struct LostObject {
    pub id: LostObjectId,
    /// Index into the map's loot table.
    pub kind: usize,
    pub position: Point2D,
    pub value: u64,
}

/// A lost object after it went into a bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundObject {
    pub id: LostObjectId,
    pub kind: usize,
    pub value: u64,
}

impl From<&LostObject> for FoundObject {
    fn from(obj: &LostObject) -> Self {
        Self {
            id: obj.id,
            kind: obj.kind,
            value: obj.value,
        }
    }
}

/// Final result of a retired dog, destined for the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub name: String,
    pub score: u64,
    pub play_time: Duration,
}

// ============================================================================
// Dog
// ============================================================================

/// Complete persistent state of a dog.
///
/// Everything needed to rebuild the dog after a restart; the gather segment
/// is derived per tick and not part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct DogState {
    pub id: DogId,
    pub name: String,
    pub position: Point2D,
    pub speed: Vec2D,
    pub direction: Direction,
    pub bag_capacity: usize,
    pub bag: Vec<FoundObject>,
    pub score: u64,
    pub play_time: Duration,
    pub inactive_time: Duration,
}

#[derive(Debug, Clone)]
pub struct Dog {
    state: DogState,
    /// Position at the start of the last tick.
    prev_position: Point2D,
}

impl Dog {
    pub fn new(id: DogId, name: impl Into<String>, position: Point2D, bag_capacity: usize) -> Self {
        Self::from_state(DogState {
            id,
            name: name.into(),
            position,
            speed: Vec2D::ZERO,
            direction: Direction::default(),
            bag_capacity,
            bag: Vec::with_capacity(bag_capacity),
            score: 0,
            play_time: Duration::ZERO,
            inactive_time: Duration::ZERO,
        })
    }

    /// Rebuild a dog from persisted state. The caller checks the bag bound.
    pub fn from_state(state: DogState) -> Self {
        Self {
            prev_position: state.position,
            state,
        }
    }

    pub fn state(&self) -> &DogState {
        &self.state
    }

    pub fn id(&self) -> DogId {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn position(&self) -> Point2D {
        self.state.position
    }

    pub fn speed(&self) -> Vec2D {
        self.state.speed
    }

    pub fn direction(&self) -> Direction {
        self.state.direction
    }

    pub fn bag(&self) -> &[FoundObject] {
        &self.state.bag
    }

    pub fn bag_capacity(&self) -> usize {
        self.state.bag_capacity
    }

    pub fn is_bag_full(&self) -> bool {
        self.state.bag.len() >= self.state.bag_capacity
    }

    pub fn score(&self) -> u64 {
        self.state.score
    }

    pub fn play_time(&self) -> Duration {
        self.state.play_time
    }

    pub fn inactive_time(&self) -> Duration {
        self.state.inactive_time
    }

    /// Head in `direction` at `speed`, or stop when `None`.
    ///
    /// Stopping keeps the facing direction. Starting to move resets the idle
    /// clock.
    pub fn set_direction(&mut self, direction: Option<Direction>, speed: f64) {
        match direction {
            Some(direction) => {
                self.state.direction = direction;
                self.state.speed = direction.velocity(speed);
                if !self.state.speed.is_zero() {
                    self.state.inactive_time = Duration::ZERO;
                }
            }
            None => self.state.speed = Vec2D::ZERO,
        }
    }

    /// Put `item` into the bag. Returns `false` (and drops nothing) when full.
    pub fn put_to_bag(&mut self, item: FoundObject) -> bool {
        if self.is_bag_full() {
            return false;
        }
        self.state.bag.push(item);
        true
    }

    /// Empty the bag into the score. Returns the points gained.
    pub fn clear_bag(&mut self) -> u64 {
        let gained: u64 = self.state.bag.drain(..).map(|item| item.value).sum();
        self.state.score += gained;
        gained
    }

    /// Move for `dt` along the roads, then account play and idle time.
    ///
    /// The dog may not leave the road it stands on by more than half the road
    /// width. Hitting a road end stops motion on that axis.
    pub fn advance(&mut self, roads: &RoadIndex, dt: Duration) {
        let pos = self.state.position;
        self.prev_position = pos;

        let candidate = pos + self.state.speed * dt.as_secs_f64();
        let bounds = Bounds::around(pos, roads);

        let (x, x_blocked) = bounds.clamp_x(candidate.x);
        let (y, y_blocked) = bounds.clamp_y(candidate.y);
        if x_blocked {
            self.state.speed.x = 0.0;
        }
        if y_blocked {
            self.state.speed.y = 0.0;
        }
        self.state.position = Point2D::new(x, y);

        self.state.play_time += dt;
        if self.state.speed.is_zero() {
            self.state.inactive_time += dt;
        }
    }

    /// Segment swept during the last tick.
    ///
    /// A dog that did not move reaches a short distance ahead of itself, so
    /// standing next to an office or an item still interacts with it.
    pub fn gather_segment(&self) -> (Point2D, Point2D) {
        let pos = self.state.position;
        if self.prev_position != pos {
            (self.prev_position, pos)
        } else {
            (pos, pos + self.state.direction.unit() * GATHER_REACH)
        }
    }

    pub fn into_record(self) -> PlayerRecord {
        PlayerRecord {
            name: self.state.name,
            score: self.state.score,
            play_time: self.state.play_time,
        }
    }
}

/// Axis-aligned drivable area around a point.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: Point2D,
    max: Point2D,
}

impl Bounds {
    fn around(pos: Point2D, roads: &RoadIndex) -> Self {
        let mut bounds = Bounds { min: pos, max: pos };
        let at = roads.roads_at(pos.rounded());

        if let Some(road) = at.horizontal {
            bounds.include(road.start().into(), road.end().into());
        }
        if let Some(road) = at.vertical {
            bounds.include(road.start().into(), road.end().into());
        }
        bounds
    }

    fn include(&mut self, a: Point2D, b: Point2D) {
        self.min.x = self.min.x.min(a.x.min(b.x) - HALF_ROAD_WIDTH);
        self.min.y = self.min.y.min(a.y.min(b.y) - HALF_ROAD_WIDTH);
        self.max.x = self.max.x.max(a.x.max(b.x) + HALF_ROAD_WIDTH);
        self.max.y = self.max.y.max(a.y.max(b.y) + HALF_ROAD_WIDTH);
    }

    fn clamp_x(&self, x: f64) -> (f64, bool) {
        clamp_axis(x, self.min.x, self.max.x)
    }

    fn clamp_y(&self, y: f64) -> (f64, bool) {
        clamp_axis(y, self.min.y, self.max.y)
    }
}

fn clamp_axis(value: f64, min: f64, max: f64) -> (f64, bool) {
    if value < min {
        (min, true)
    } else if value > max {
        (max, true)
    } else {
        (value, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;
    use crate::model::Road;

    const SECOND: Duration = Duration::from_secs(1);

    fn straight_road() -> RoadIndex {
        RoadIndex::new(&[Road::horizontal(Point::new(0, 0), 10)])
    }

    #[test]
    fn test_direction_velocity() {
        assert_eq!(Direction::North.velocity(2.0), Vec2D::new(0.0, -2.0));
        assert_eq!(Direction::South.velocity(2.0), Vec2D::new(0.0, 2.0));
        assert_eq!(Direction::West.velocity(2.0), Vec2D::new(-2.0, 0.0));
        assert_eq!(Direction::East.velocity(2.0), Vec2D::new(2.0, 0.0));
    }

    #[test]
    fn test_stop_keeps_facing() {
        let mut dog = Dog::new(0, "Rex", Point2D::default(), 3);
        dog.set_direction(Some(Direction::West), 1.0);
        dog.set_direction(None, 1.0);
        assert_eq!(dog.direction(), Direction::West);
        assert!(dog.speed().is_zero());
    }

    #[test]
    fn test_move_within_road() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(1.0, 0.0), 3);
        dog.set_direction(Some(Direction::East), 2.0);
        dog.advance(&roads, SECOND);
        assert_eq!(dog.position(), Point2D::new(3.0, 0.0));
        assert_eq!(dog.speed(), Vec2D::new(2.0, 0.0));
        assert_eq!(dog.inactive_time(), Duration::ZERO);
        assert_eq!(dog.gather_segment(), (Point2D::new(1.0, 0.0), Point2D::new(3.0, 0.0)));
    }

    #[test]
    fn test_road_end_clamps_and_stops() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(9.0, 0.0), 3);
        dog.set_direction(Some(Direction::East), 5.0);
        dog.advance(&roads, SECOND);
        assert_eq!(dog.position(), Point2D::new(10.0 + HALF_ROAD_WIDTH, 0.0));
        assert!(dog.speed().is_zero());
        // stopped this tick, so it counts as idle
        assert_eq!(dog.inactive_time(), SECOND);
    }

    #[test]
    fn test_sideways_limited_to_half_width() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(5.0, 0.0), 3);
        dog.set_direction(Some(Direction::North), 1.0);
        dog.advance(&roads, SECOND);
        assert_eq!(dog.position(), Point2D::new(5.0, -HALF_ROAD_WIDTH));
        assert!(dog.speed().is_zero());
    }

    #[test]
    fn test_turn_at_crossing() {
        let roads = RoadIndex::new(&[
            Road::horizontal(Point::new(0, 5), 10),
            Road::vertical(Point::new(5, 0), 10),
        ]);
        let mut dog = Dog::new(0, "Rex", Point2D::new(5.0, 5.0), 3);
        dog.set_direction(Some(Direction::South), 1.0);
        dog.advance(&roads, SECOND * 3);
        assert_eq!(dog.position(), Point2D::new(5.0, 8.0));
    }

    #[test]
    fn test_zero_dt_keeps_position() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(4.0, 0.0), 3);
        dog.set_direction(Some(Direction::East), 1.0);
        dog.advance(&roads, Duration::ZERO);
        assert_eq!(dog.position(), Point2D::new(4.0, 0.0));
        assert_eq!(dog.speed(), Vec2D::new(1.0, 0.0));
        assert_eq!(dog.play_time(), Duration::ZERO);
        assert_eq!(dog.inactive_time(), Duration::ZERO);
    }

    #[test]
    fn test_stationary_gather_segment_faces_forward() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(2.0, 0.0), 3);
        dog.set_direction(Some(Direction::East), 1.0);
        dog.set_direction(None, 1.0);
        dog.advance(&roads, SECOND);
        assert_eq!(
            dog.gather_segment(),
            (Point2D::new(2.0, 0.0), Point2D::new(2.0 + GATHER_REACH, 0.0))
        );
    }

    #[test]
    fn test_bag_bound_and_clear() {
        let mut dog = Dog::new(0, "Rex", Point2D::default(), 2);
        let item = |id, value| FoundObject { id, kind: 0, value };
        assert!(dog.put_to_bag(item(0, 10)));
        assert!(dog.put_to_bag(item(1, 5)));
        assert!(!dog.put_to_bag(item(2, 1)));
        assert_eq!(dog.bag().len(), 2);

        assert_eq!(dog.clear_bag(), 15);
        assert_eq!(dog.score(), 15);
        assert!(dog.bag().is_empty());
        assert_eq!(dog.clear_bag(), 0);
    }

    #[test]
    fn test_moving_resets_idle_clock() {
        let roads = straight_road();
        let mut dog = Dog::new(0, "Rex", Point2D::new(5.0, 0.0), 3);
        dog.advance(&roads, SECOND * 2);
        assert_eq!(dog.inactive_time(), SECOND * 2);
        assert_eq!(dog.play_time(), SECOND * 2);

        dog.set_direction(Some(Direction::East), 1.0);
        assert_eq!(dog.inactive_time(), Duration::ZERO);
        dog.advance(&roads, SECOND);
        assert_eq!(dog.inactive_time(), Duration::ZERO);
        assert_eq!(dog.play_time(), SECOND * 3);
    }
}
