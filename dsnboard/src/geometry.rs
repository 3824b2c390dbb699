//! Board Geometry
//!
//! Points in normalized board units (millimeters), the tolerance-keyed
//! endpoint identity used by the stitcher, copper layers, and the pad shape
//! variants shared by the footprint catalog and the pad reconciler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default endpoint matching tolerance in millimeters (1 micron).
pub const DEFAULT_EPSILON_MM: f64 = 0.001;

/// A 2D point in board millimeters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Tolerance equality: both axes differ by less than `epsilon`.
    pub fn approx_eq(&self, other: &Point, epsilon: f64) -> bool {
        (self.x - other.x).abs() < epsilon && (self.y - other.y).abs() < epsilon
    }

    /// Rotate around the origin by `degrees` (counter-clockwise).
    pub fn rotated(&self, degrees: f64) -> Point {
        if degrees == 0.0 {
            return *self;
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Key of the tolerance cell this point falls in.
    pub fn key(&self, epsilon: f64) -> PointKey {
        PointKey::new(self, epsilon)
    }
}

/// Tolerance-rounded coordinate key.
///
/// Each axis is rounded to the nearest multiple of epsilon; two endpoints
/// "share" a location when their keys are equal or adjacent and the raw
/// coordinates are within epsilon on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey {
    pub ix: i64,
    pub iy: i64,
}

impl PointKey {
    pub fn new(point: &Point, epsilon: f64) -> Self {
        Self {
            ix: (point.x / epsilon).round() as i64,
            iy: (point.y / epsilon).round() as i64,
        }
    }

    /// This key and its eight neighbours.
    ///
    /// Two points closer than epsilon can round into adjacent cells, so
    /// lookups scan the 3x3 block and then filter on raw distance.
    pub fn neighborhood(self) -> impl Iterator<Item = PointKey> {
        (-1..=1).flat_map(move |dx| {
            (-1..=1).map(move |dy| PointKey {
                ix: self.ix + dx,
                iy: self.iy + dy,
            })
        })
    }

    /// Fixed-precision string form (3 decimals at the default epsilon).
    pub fn format(&self, epsilon: f64) -> String {
        let decimals = (-epsilon.log10()).round().max(0.0) as usize;
        // `+ 0.0` folds negative zero so "-0.000" never appears
        let x = self.ix as f64 * epsilon + 0.0;
        let y = self.iy as f64 * epsilon + 0.0;
        format!("{:.*},{:.*}", decimals, x, decimals, y)
    }
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(DEFAULT_EPSILON_MM))
    }
}

/// Copper layer. Only the two outer layers are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Top,
    Bottom,
}

impl Default for Layer {
    fn default() -> Self {
        Layer::Top
    }
}

impl Layer {
    /// Normalize a numeric or symbolic layer name.
    ///
    /// Returns `None` for names that are neither outer layer; callers
    /// decide how to fall back.
    pub fn from_name(name: &str) -> Option<Layer> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Some(Layer::Top);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "1" | "f.cu" | "top" | "front" | "f_cu" => Some(Layer::Top),
            "2" | "b.cu" | "bottom" | "back" | "b_cu" => Some(Layer::Bottom),
            _ => None,
        }
    }

    pub fn opposite(self) -> Layer {
        match self {
            Layer::Top => Layer::Bottom,
            Layer::Bottom => Layer::Top,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Top => write!(f, "top"),
            Layer::Bottom => write!(f, "bottom"),
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bbox.include(p);
        }
        Some(bbox)
    }

    pub fn include(&mut self, p: &Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Normalized pad shape.
///
/// Dimensions are in whatever unit the producer works in: design units
/// inside the footprint catalog, millimeters once placed on the board.
/// Polygon points are relative to the pad center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PadShape {
    Circle { diameter: f64 },
    Rect { width: f64, height: f64 },
    Polygon { points: Vec<Point> },
    Pill { width: f64, height: f64 },
}

impl PadShape {
    /// Width and height of the shape's bounding rectangle
    pub fn extent(&self) -> (f64, f64) {
        match self {
            PadShape::Circle { diameter } => (*diameter, *diameter),
            PadShape::Rect { width, height } | PadShape::Pill { width, height } => {
                (*width, *height)
            }
            PadShape::Polygon { points } => BoundingBox::from_points(points)
                .map(|b| (b.width(), b.height()))
                .unwrap_or((0.0, 0.0)),
        }
    }

    /// Largest dimension, used as the outer diameter of plated holes.
    pub fn outer_diameter(&self) -> f64 {
        let (w, h) = self.extent();
        w.max(h)
    }

    /// Whether a point given relative to the pad center lies inside the
    /// shape grown by `slack` on every side.
    pub fn contains(&self, local: &Point, slack: f64) -> bool {
        match self {
            PadShape::Circle { diameter } => {
                local.distance_to(&Point::default()) <= diameter / 2.0 + slack
            }
            PadShape::Rect { width, height } => {
                local.x.abs() <= width / 2.0 + slack && local.y.abs() <= height / 2.0 + slack
            }
            PadShape::Pill { width, height } => {
                // Stadium: a segment along the long axis swept by radius
                let radius = width.min(*height) / 2.0;
                let half_len = (width.max(*height) / 2.0 - radius).max(0.0);
                let (along, across) = if width >= height {
                    (local.x, local.y)
                } else {
                    (local.y, local.x)
                };
                let clamped = along.clamp(-half_len, half_len);
                let d = Point::new(along - clamped, across).distance_to(&Point::default());
                d <= radius + slack
            }
            PadShape::Polygon { points } => {
                if point_in_polygon(local, points) {
                    return true;
                }
                slack > 0.0 && distance_to_polygon_edges(local, points) <= slack
            }
        }
    }

    /// Scale every dimension by `factor` (design units to millimeters).
    pub fn scaled(&self, factor: f64) -> PadShape {
        match self {
            PadShape::Circle { diameter } => PadShape::Circle {
                diameter: diameter * factor,
            },
            PadShape::Rect { width, height } => PadShape::Rect {
                width: width * factor,
                height: height * factor,
            },
            PadShape::Pill { width, height } => PadShape::Pill {
                width: width * factor,
                height: height * factor,
            },
            PadShape::Polygon { points } => PadShape::Polygon {
                points: points
                    .iter()
                    .map(|p| Point::new(p.x * factor, p.y * factor))
                    .collect(),
            },
        }
    }

    /// Apply a pad's pose: optional X mirror (back side) then rotation.
    ///
    /// Rect and pill pads swap their sides on quarter turns; other angles
    /// keep the unrotated extent as an approximation.
    pub fn posed(&self, mirror_x: bool, rotation_deg: f64) -> PadShape {
        let quarter_turn = {
            let r = rotation_deg.rem_euclid(180.0);
            (r - 90.0).abs() < 1e-6
        };
        match self {
            PadShape::Circle { .. } => self.clone(),
            PadShape::Rect { width, height } if quarter_turn => PadShape::Rect {
                width: *height,
                height: *width,
            },
            PadShape::Pill { width, height } if quarter_turn => PadShape::Pill {
                width: *height,
                height: *width,
            },
            PadShape::Rect { .. } | PadShape::Pill { .. } => self.clone(),
            PadShape::Polygon { points } => PadShape::Polygon {
                points: points
                    .iter()
                    .map(|p| {
                        let p = if mirror_x { Point::new(-p.x, p.y) } else { *p };
                        p.rotated(rotation_deg)
                    })
                    .collect(),
            },
        }
    }
}

/// Even-odd ray casting test.
pub fn point_in_polygon(p: &Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = &polygon[i];
        let b = &polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn distance_to_polygon_edges(p: &Point, polygon: &[Point]) -> f64 {
    if polygon.is_empty() {
        return f64::INFINITY;
    }
    let mut best = f64::INFINITY;
    for i in 0..polygon.len() {
        let a = &polygon[i];
        let b = &polygon[(i + 1) % polygon.len()];
        best = best.min(distance_to_segment(p, a, b));
    }
    best
}

fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Length of a polyline
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}
