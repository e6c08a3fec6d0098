//! Gather-event detection.
//!
//! Each gatherer sweeps a segment during a tick; each item is a point with a
//! collection radius. An item is gathered when its projection falls inside
//! the segment and its perpendicular distance is within the sum of radii.

use std::cmp::Ordering;

use crate::geom::Point2D;

/// A collectible or dropoff target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    pub position: Point2D,
    pub radius: f64,
}

/// A sweeping actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gatherer {
    pub start: Point2D,
    pub end: Point2D,
    pub radius: f64,
}

impl Gatherer {
    fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

/// One detected overlap, referring to items and gatherers by slice index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatheringEvent {
    pub item_index: usize,
    pub gatherer_index: usize,
    pub sq_distance: f64,
    /// Projection ratio along the gatherer's segment, in `[0, 1]`.
    pub time: f64,
}

/// Projection of point `c` onto segment `a → b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionResult {
    pub sq_distance: f64,
    pub proj_ratio: f64,
}

impl CollectionResult {
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        (0.0..=1.0).contains(&self.proj_ratio)
            && self.sq_distance <= collect_radius * collect_radius
    }
}

/// Project `c` onto `a → b`. Requires `a != b`.
pub fn try_collect_point(a: Point2D, b: Point2D, c: Point2D) -> CollectionResult {
    let u = c - a;
    let v = b - a;
    let u_dot_v = u.x * v.x + u.y * v.y;
    let u_len2 = u.x * u.x + u.y * u.y;
    let v_len2 = v.x * v.x + v.y * v.y;
    debug_assert!(v_len2 > 0.0, "degenerate gather segment");

    let proj_ratio = u_dot_v / v_len2;
    let sq_distance = (u_len2 - (u_dot_v * u_dot_v) / v_len2).max(0.0);

    CollectionResult {
        sq_distance,
        proj_ratio,
    }
}

/// All gather events, in resolution order.
///
/// Ordered by time along the segment, then item index, then gatherer index,
/// so equidistant items resolve deterministically.
pub fn find_gather_events(items: &[Item], gatherers: &[Gatherer]) -> Vec<GatheringEvent> {
    let mut events = Vec::new();

    for (gatherer_index, gatherer) in gatherers.iter().enumerate() {
        if gatherer.is_degenerate() {
            continue;
        }
        for (item_index, item) in items.iter().enumerate() {
            let result = try_collect_point(gatherer.start, gatherer.end, item.position);
            if result.is_collected(gatherer.radius + item.radius) {
                events.push(GatheringEvent {
                    item_index,
                    gatherer_index,
                    sq_distance: result.sq_distance,
                    time: result.proj_ratio,
                });
            }
        }
    }

    events.sort_by(|a, b| {
        a.time
            .partial_cmp(&b.time)
            .unwrap_or(Ordering::Equal)
            .then(a.item_index.cmp(&b.item_index))
            .then(a.gatherer_index.cmp(&b.gatherer_index))
    });
    events
}
