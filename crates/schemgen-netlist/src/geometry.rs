//! Schematic-space geometry and the symbol-to-sheet coordinate transform.
//!
//! Symbol libraries use a Y-up coordinate system while the schematic sheet is
//! Y-down. The conversion lives in exactly one place,
//! [`to_schematic_space`], with [`from_schematic_space`] as its inverse.

use schemgen_eda::{LocalBounds, PinRotation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the sheet, Y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: Point) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Equal within a micrometre; sheet coordinates are millimetres.
    pub fn approx_eq(self, other: Point) -> bool {
        (self.x - other.x).abs() < 1e-3 && (self.y - other.y).abs() < 1e-3
    }

    /// Rounded to 0.1 µm, the precision written to schematic files, so
    /// points computed along different paths compare equal.
    pub fn canonical(self) -> Self {
        Point::new((self.x * 1e4).round() / 1e4, (self.y * 1e4).round() / 1e4)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Axis-aligned rectangle in sheet space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Rect {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Interiors overlap. Rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn inflate(&self, margin: f64) -> Rect {
        Rect {
            min: self.min.offset(-margin, -margin),
            max: self.max.offset(margin, margin),
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            min: self.min.offset(dx, dy),
            max: self.max.offset(dx, dy),
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// Counter-clockwise rotation of a placed symbol, as written in KiCad's
/// `(at x y angle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Orientation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Orientation {
    pub fn degrees(self) -> u16 {
        match self {
            Orientation::R0 => 0,
            Orientation::R90 => 90,
            Orientation::R180 => 180,
            Orientation::R270 => 270,
        }
    }

    fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    /// Rotate a Y-up vector counter-clockwise.
    fn rotate(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Orientation::R0 => (x, y),
            Orientation::R90 => (-y, x),
            Orientation::R180 => (-x, -y),
            Orientation::R270 => (y, -x),
        }
    }

    fn unrotate(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Orientation::R0 => (x, y),
            Orientation::R90 => (y, -x),
            Orientation::R180 => (-x, -y),
            Orientation::R270 => (-y, x),
        }
    }
}

impl TryFrom<u16> for Orientation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Orientation::R0),
            90 => Ok(Orientation::R90),
            180 => Ok(Orientation::R180),
            270 => Ok(Orientation::R270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl From<Orientation> for u16 {
    fn from(o: Orientation) -> u16 {
        o.degrees()
    }
}

/// KiCad mirror axis. `X` flips top/bottom, `Y` flips left/right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mirror {
    X,
    Y,
}

impl Mirror {
    fn apply(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Mirror::X => (x, -y),
            Mirror::Y => (-x, y),
        }
    }
}

/// Placement of one symbol instance: rotation first, then mirror, then the
/// translation to `position`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Transform {
    pub position: Point,
    pub orientation: Orientation,
    pub mirror: Option<Mirror>,
}

impl Transform {
    pub fn at(position: Point) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }

    /// Pin orientation after this transform.
    pub fn apply_to_rotation(&self, rotation: PinRotation) -> PinRotation {
        let rotated = rotation.rotated(self.orientation.quarter_turns());
        match self.mirror {
            None => rotated,
            Some(Mirror::X) => rotated.mirrored_y(),
            Some(Mirror::Y) => rotated.mirrored_x(),
        }
    }

    /// Sheet rectangle covered by symbol-local `bounds`.
    pub fn apply_to_bounds(&self, bounds: &LocalBounds) -> Rect {
        let b = bounds.or_origin();
        let a = to_schematic_space((b.min_x, b.min_y), self);
        let c = to_schematic_space((b.max_x, b.max_y), self);
        Rect::from_corners(a, c)
    }
}

/// Map a symbol-local (Y-up) point onto the sheet (Y-down).
///
/// With no rotation or mirror this is `(X + x, Y - y)`.
pub fn to_schematic_space(local: (f64, f64), transform: &Transform) -> Point {
    let (x, y) = transform.orientation.rotate(local.0, local.1);
    let (x, y) = match transform.mirror {
        Some(m) => m.apply(x, y),
        None => (x, y),
    };
    Point::new(transform.position.x + x, transform.position.y - y)
}

/// Inverse of [`to_schematic_space`].
pub fn from_schematic_space(point: Point, transform: &Transform) -> (f64, f64) {
    let x = point.x - transform.position.x;
    let y = transform.position.y - point.y;
    let (x, y) = match transform.mirror {
        Some(m) => m.apply(x, y),
        None => (x, y),
    };
    transform.orientation.unrotate(x, y)
}

/// Round to the nearest grid line, halves rounding up (toward +inf).
pub fn snap_to_grid(value: f64, pitch: f64) -> f64 {
    (value / pitch + 0.5).floor() * pitch
}

pub fn snap_point(p: Point, pitch: f64) -> Point {
    Point::new(snap_to_grid(p.x, pitch), snap_to_grid(p.y, pitch))
}
