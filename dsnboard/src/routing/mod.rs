//! Routing
//!
//! Turns autorouter output into board traces in three steps:
//! - [`extract`]: flatten routing results into per-net segments and vias
//! - [`stitch`]: merge segments sharing endpoints into maximal chains
//! - [`reconcile`]: attach chain ends to pads and classify hanging chains

pub mod extract;
pub mod reconcile;
pub mod stitch;

use serde::{Deserialize, Serialize};

use crate::geometry::{Layer, Point};

pub use extract::{ExtractedNet, SegmentExtractor};
pub use reconcile::{PadReconciler, PortLocation, ReconciledTrace, TraceClass};
pub use stitch::{StitchedTrace, Stitcher};

/// One point of a route.
///
/// Consecutive wire points on the same layer form a straight run; a via
/// point is an instantaneous layer change and carries no length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route_type", rename_all = "snake_case")]
pub enum RoutePoint {
    Wire {
        x: f64,
        y: f64,
        width: f64,
        layer: Layer,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_port_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_port_id: Option<String>,
    },
    Via {
        x: f64,
        y: f64,
        from_layer: Layer,
        to_layer: Layer,
    },
}

impl RoutePoint {
    pub fn wire(point: Point, width: f64, layer: Layer) -> Self {
        RoutePoint::Wire {
            x: point.x,
            y: point.y,
            width,
            layer,
            start_port_id: None,
            end_port_id: None,
        }
    }

    pub fn via(point: Point, from_layer: Layer, to_layer: Layer) -> Self {
        RoutePoint::Via {
            x: point.x,
            y: point.y,
            from_layer,
            to_layer,
        }
    }

    pub fn position(&self) -> Point {
        match self {
            RoutePoint::Wire { x, y, .. } | RoutePoint::Via { x, y, .. } => Point::new(*x, *y),
        }
    }

    pub fn is_via(&self) -> bool {
        matches!(self, RoutePoint::Via { .. })
    }

    /// Layer of a wire point; `None` for vias
    pub fn layer(&self) -> Option<Layer> {
        match self {
            RoutePoint::Wire { layer, .. } => Some(*layer),
            RoutePoint::Via { .. } => None,
        }
    }
}

/// Path length of a route: the sum of distances between consecutive wire
/// points, skipping vias.
pub fn route_length(route: &[RoutePoint]) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<Point> = None;
    for p in route.iter().filter(|p| !p.is_via()) {
        let pos = p.position();
        if let Some(prev) = previous {
            total += prev.distance_to(&pos);
        }
        previous = Some(pos);
    }
    total
}

/// A straight or polyline piece of routed copper on a single layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub net: String,
    pub layer: Layer,
    /// Millimeters
    pub width: f64,
    /// At least two points
    pub points: Vec<Point>,
}

impl Segment {
    pub fn new(net: impl Into<String>, layer: Layer, width: f64, points: Vec<Point>) -> Self {
        Self {
            net: net.into(),
            layer,
            width,
            points,
        }
    }

    pub fn start(&self) -> Point {
        self.points.first().copied().unwrap_or_default()
    }

    pub fn end(&self) -> Point {
        self.points.last().copied().unwrap_or_default()
    }

    pub fn length(&self) -> f64 {
        crate::geometry::polyline_length(&self.points)
    }

    pub fn to_route(&self) -> Vec<RoutePoint> {
        self.points
            .iter()
            .map(|p| RoutePoint::wire(*p, self.width, self.layer))
            .collect()
    }
}

/// A via found in the routing results. Always spans the two outer layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViaRecord {
    pub net: String,
    pub position: Point,
    pub from_layer: Layer,
    pub to_layer: Layer,
    pub padstack_id: String,
    pub outer_diameter: f64,
    pub hole_diameter: f64,
}

impl ViaRecord {
    pub fn new(net: impl Into<String>, position: Point) -> Self {
        Self {
            net: net.into(),
            position,
            from_layer: Layer::Top,
            to_layer: Layer::Bottom,
            padstack_id: String::new(),
            outer_diameter: 0.6,
            hole_diameter: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_length_skips_vias() {
        let route = vec![
            RoutePoint::wire(Point::new(0.0, 0.0), 0.2, Layer::Top),
            RoutePoint::wire(Point::new(3.0, 0.0), 0.2, Layer::Top),
            RoutePoint::via(Point::new(3.0, 0.0), Layer::Top, Layer::Bottom),
            RoutePoint::wire(Point::new(3.0, 0.0), 0.2, Layer::Bottom),
            RoutePoint::wire(Point::new(3.0, 4.0), 0.2, Layer::Bottom),
        ];
        assert!((route_length(&route) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_route() {
        let seg = Segment::new(
            "GND",
            Layer::Bottom,
            0.25,
            vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
        );
        let route = seg.to_route();
        assert_eq!(route.len(), 2);
        assert_eq!(route[1].layer(), Some(Layer::Bottom));
        assert!((route_length(&route) - seg.length()).abs() < 1e-12);
    }

    #[test]
    fn test_route_point_json_shape() {
        let json = serde_json::to_value(RoutePoint::via(
            Point::new(1.0, 2.0),
            Layer::Top,
            Layer::Bottom,
        ))
        .unwrap();
        assert_eq!(json["route_type"], "via");
        assert_eq!(json["from_layer"], "top");
    }
}
