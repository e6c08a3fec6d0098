//! Spatial index of merged road fragments.
//!
//! Roads sharing a row (horizontal) or column (vertical) are merged into
//! maximal closed intervals at build time, so a query at any point returns
//! the full drivable range through it rather than whichever declared road
//! happened to cover it.

use std::collections::HashMap;

use crate::geom::{Coord, Point};
use crate::model::Road;

/// Closed interval `[start, end]` along a road's axis.
pub type Fragment = (Coord, Coord);

/// Fragments covering a queried point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoadsAtPoint {
    pub horizontal: Option<Road>,
    pub vertical: Option<Road>,
}

impl RoadsAtPoint {
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none()
    }
}

/// Index of merged, sorted fragments keyed by fixed coordinate.
#[derive(Debug, Clone, Default)]
pub struct RoadIndex {
    /// row (y) → fragments along x
    horizontal: HashMap<Coord, Vec<Fragment>>,
    /// column (x) → fragments along y
    vertical: HashMap<Coord, Vec<Fragment>>,
}

impl RoadIndex {
    pub fn new(roads: &[Road]) -> Self {
        let mut horizontal: HashMap<Coord, Vec<Fragment>> = HashMap::new();
        let mut vertical: HashMap<Coord, Vec<Fragment>> = HashMap::new();

        for road in roads {
            let road = road.normalized();
            let (start, end) = (road.start(), road.end());
            if road.is_horizontal() {
                horizontal.entry(start.y).or_default().push((start.x, end.x));
            } else {
                vertical.entry(start.x).or_default().push((start.y, end.y));
            }
        }

        for fragments in horizontal.values_mut().chain(vertical.values_mut()) {
            merge_fragments(fragments);
        }

        Self {
            horizontal,
            vertical,
        }
    }

    /// Merged fragments covering `pt`, at most one per axis.
    pub fn roads_at(&self, pt: Point) -> RoadsAtPoint {
        let horizontal = self
            .horizontal
            .get(&pt.y)
            .and_then(|fragments| find_fragment(fragments, pt.x))
            .map(|(x0, x1)| Road::horizontal(Point::new(x0, pt.y), x1));

        let vertical = self
            .vertical
            .get(&pt.x)
            .and_then(|fragments| find_fragment(fragments, pt.y))
            .map(|(y0, y1)| Road::vertical(Point::new(pt.x, y0), y1));

        RoadsAtPoint {
            horizontal,
            vertical,
        }
    }

    /// Merged fragments on row `y`, sorted by start.
    pub fn horizontal_fragments(&self, y: Coord) -> &[Fragment] {
        self.horizontal.get(&y).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merged fragments on column `x`, sorted by start.
    pub fn vertical_fragments(&self, x: Coord) -> &[Fragment] {
        self.vertical.get(&x).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Sort by start and sweep-merge overlapping or touching fragments in place.
fn merge_fragments(fragments: &mut Vec<Fragment>) {
    fragments.sort_unstable_by_key(|f| f.0);

    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for &(start, end) in fragments.iter() {
        match merged.last_mut() {
            // closed intervals: touching at an endpoint still merges
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    *fragments = merged;
}

/// Binary search for the fragment containing `c`.
fn find_fragment(fragments: &[Fragment], c: Coord) -> Option<Fragment> {
    // first fragment whose end is >= c
    let idx = fragments.partition_point(|&(_, end)| end < c);
    fragments
        .get(idx)
        .copied()
        .filter(|&(start, _)| start <= c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_roads_merge_into_union() {
        let roads = [
            Road::horizontal(Point::new(0, 0), 5),
            Road::horizontal(Point::new(3, 0), 9),
            Road::horizontal(Point::new(20, 0), 15),
        ];
        let index = RoadIndex::new(&roads);
        assert_eq!(index.horizontal_fragments(0), &[(0, 9), (15, 20)]);

        // every covered point reports the merged union, never a sub-fragment
        for x in 0..=9 {
            let found = index.roads_at(Point::new(x, 0)).horizontal.unwrap();
            assert_eq!(found.start(), Point::new(0, 0));
            assert_eq!(found.end(), Point::new(9, 0));
        }
    }

    #[test]
    fn test_touching_endpoints_merge() {
        let roads = [
            Road::vertical(Point::new(2, 0), 4),
            Road::vertical(Point::new(2, 8), 4),
        ];
        let index = RoadIndex::new(&roads);
        assert_eq!(index.vertical_fragments(2), &[(0, 8)]);
    }

    #[test]
    fn test_adjacent_but_disjoint_do_not_merge() {
        let roads = [
            Road::horizontal(Point::new(0, 1), 4),
            Road::horizontal(Point::new(5, 1), 9),
        ];
        let index = RoadIndex::new(&roads);
        assert_eq!(index.horizontal_fragments(1), &[(0, 4), (5, 9)]);
        assert_eq!(
            index.roads_at(Point::new(5, 1)).horizontal,
            Some(Road::horizontal(Point::new(5, 1), 9))
        );
    }

    #[test]
    fn test_contained_road_does_not_shrink_fragment() {
        let roads = [
            Road::horizontal(Point::new(0, 0), 10),
            Road::horizontal(Point::new(2, 0), 3),
        ];
        let index = RoadIndex::new(&roads);
        assert_eq!(index.horizontal_fragments(0), &[(0, 10)]);
    }

    #[test]
    fn test_crossing_returns_both_axes() {
        let roads = [
            Road::horizontal(Point::new(0, 5), 10),
            Road::vertical(Point::new(5, 0), 10),
        ];
        let index = RoadIndex::new(&roads);
        let at = index.roads_at(Point::new(5, 5));
        assert!(at.horizontal.is_some());
        assert!(at.vertical.is_some());

        let off = index.roads_at(Point::new(7, 7));
        assert!(off.is_empty());
    }

    #[test]
    fn test_fragments_only_on_own_row() {
        let roads = [Road::horizontal(Point::new(0, 0), 10)];
        let index = RoadIndex::new(&roads);
        assert!(index.roads_at(Point::new(3, 1)).horizontal.is_none());
        assert!(index.roads_at(Point::new(11, 0)).horizontal.is_none());
        assert!(index.roads_at(Point::new(-1, 0)).horizontal.is_none());
    }
}
