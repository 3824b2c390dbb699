//! Unit/Transform Resolver
//!
//! Maps design units to board millimeters. A transform is a uniform scale
//! plus an optional translation that centers the board on the origin.

use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Point};
use crate::parser::schema::{Boundary, DsnDesign, Resolution};

/// Resolution assumed for design files that do not declare one
pub const DSN_DEFAULT_RESOLUTION: (&str, f64) = ("mil", 1000.0);

/// Fallback for a session resolution with an unknown unit or a non-positive
/// value. Sessions that declare no resolution take the board's scale.
pub const SES_DEFAULT_RESOLUTION: (&str, f64) = ("um", 1.0);

/// Unit a design declares its resolution in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignUnit {
    Um,
    Mil,
    Mm,
    In,
}

impl DesignUnit {
    pub fn parse(unit: &str) -> Option<DesignUnit> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "um" => Some(DesignUnit::Um),
            "mil" => Some(DesignUnit::Mil),
            "mm" => Some(DesignUnit::Mm),
            "in" | "inch" => Some(DesignUnit::In),
            _ => None,
        }
    }

    /// Millimeters in one unit
    pub fn to_mm(self) -> f64 {
        match self {
            DesignUnit::Um => 0.001,
            DesignUnit::Mil => 0.0254,
            DesignUnit::Mm => 1.0,
            DesignUnit::In => 25.4,
        }
    }
}

/// Affine map from design units to millimeters: `mm = du * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoordinateTransform {
    pub fn scale_only(scale: f64) -> Self {
        Self {
            scale,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Scale for a declared resolution, falling back to `default` when the
    /// declaration is absent. Unknown units are treated as the default unit.
    pub fn from_resolution(resolution: Option<&Resolution>, default: (&str, f64)) -> Self {
        let (unit, value) = match resolution {
            Some(r) => (r.unit.as_str(), r.value),
            None => {
                tracing::debug!(
                    "No resolution declared, assuming {} {}",
                    default.0,
                    default.1
                );
                default
            }
        };

        let unit_mm = match DesignUnit::parse(unit) {
            Some(u) => u.to_mm(),
            None => {
                tracing::warn!("Unknown resolution unit '{}', assuming {}", unit, default.0);
                DesignUnit::parse(default.0).map(|u| u.to_mm()).unwrap_or(1.0)
            }
        };
        let value = if value > 0.0 { value } else { default.1 };

        Self::scale_only(unit_mm / value)
    }

    /// Transform for a design file, centered on its outline (or on its
    /// placements when there is no outline) when `center` is set.
    pub fn for_design(design: &DsnDesign, center: bool) -> Self {
        let mut transform =
            Self::from_resolution(design.resolution.as_ref(), DSN_DEFAULT_RESOLUTION);

        if center {
            if let Some(bbox) = design_extent(design) {
                let c = bbox.center();
                transform.offset_x = -c.x * transform.scale;
                transform.offset_y = -c.y * transform.scale;
            }
        }

        transform
    }

    /// Transform for routing results overlaid on an already placed board.
    ///
    /// The routes get their own scale but reuse the board's translation; they
    /// are never re-centered on their own extent.
    pub fn for_overlay(resolution: Option<&Resolution>, board: &CoordinateTransform) -> Self {
        let scale = match resolution {
            Some(_) => Self::from_resolution(resolution, SES_DEFAULT_RESOLUTION).scale,
            None => board.scale,
        };
        Self {
            scale,
            offset_x: board.offset_x,
            offset_y: board.offset_y,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> Point {
        Point::new(
            x * self.scale + self.offset_x,
            y * self.scale + self.offset_y,
        )
    }

    /// Convert a length (no translation)
    pub fn length(&self, du: f64) -> f64 {
        du * self.scale
    }
}

/// Bounding box of the outline in design units, or of placements when the
/// outline is empty.
pub fn design_extent(design: &DsnDesign) -> Option<BoundingBox> {
    boundary_extent(&design.boundary).or_else(|| {
        let places: Vec<Point> = design
            .placement
            .components
            .iter()
            .flat_map(|c| c.places.iter())
            .map(|p| Point::new(p.x, p.y))
            .collect();
        BoundingBox::from_points(&places)
    })
}

pub fn boundary_extent(boundary: &Boundary) -> Option<BoundingBox> {
    let mut points: Vec<Point> = boundary
        .paths
        .iter()
        .flat_map(|p| p.coordinates.chunks_exact(2))
        .map(|xy| Point::new(xy[0], xy[1]))
        .collect();
    for r in &boundary.rects {
        points.push(Point::new(r.x1, r.y1));
        points.push(Point::new(r.x2, r.y2));
    }
    BoundingBox::from_points(&points)
}
