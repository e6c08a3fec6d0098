//! Planar geometry shared by the map model and the simulation.
//!
//! Map templates use integer grid coordinates ([`Point`]); actors and items
//! live in continuous space ([`Point2D`], [`Vec2D`]).

use std::ops::{Add, Mul, Sub};

/// Integer grid coordinate used by map templates.
pub type Coord = i32;

/// A point on the integer map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }
}

/// Integer size of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: Coord,
    pub height: Coord,
}

/// Axis-aligned rectangle on the map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub position: Point,
    pub size: Size,
}

/// Integer offset (used for office sprite placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub dx: Coord,
    pub dy: Coord,
}

/// A point in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Nearest grid point (half away from zero).
    pub fn rounded(self) -> Point {
        Point {
            x: self.x.round() as Coord,
            y: self.y.round() as Coord,
        }
    }
}

impl From<Point> for Point2D {
    fn from(p: Point) -> Self {
        Self {
            x: f64::from(p.x),
            y: f64::from(p.y),
        }
    }
}

/// A displacement or velocity in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub const ZERO: Vec2D = Vec2D { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add<Vec2D> for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Vec2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Vec2D;

    fn sub(self, rhs: Point2D) -> Vec2D {
        Vec2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2D {
    type Output = Vec2D;

    fn mul(self, rhs: f64) -> Vec2D {
        Vec2D::new(self.x * rhs, self.y * rhs)
    }
}

/// Linear interpolation between two grid points; `t` in `[0, 1]`.
pub fn lerp(a: Point, b: Point, t: f64) -> Point2D {
    let a = Point2D::from(a);
    let b = Point2D::from(b);
    Point2D::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}
