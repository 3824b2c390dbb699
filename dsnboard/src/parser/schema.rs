//! Interchange Schema Definitions
//!
//! Typed tree for Specctra design (.dsn) and session (.ses) files.
//! Coordinates and sizes are kept in raw design units; conversion to
//! millimeters happens in the pipeline once a resolution is known.

use serde::{Deserialize, Serialize};

/// Declared resolution: `value` design units per one `unit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub unit: String,
    pub value: f64,
}

impl Resolution {
    pub fn new(unit: impl Into<String>, value: f64) -> Self {
        Self {
            unit: unit.into(),
            value,
        }
    }
}

/// A complete design (placement) file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DsnDesign {
    /// Name declared on the root `(pcb <name> ...)` element
    pub name: String,
    pub resolution: Option<Resolution>,
    pub boundary: Boundary,
    pub placement: Placement,
    pub library: Library,
    pub network: Network,
    /// Pre-routed copper carried in the `(wiring ...)` section
    pub wiring: Option<RoutingResults>,
}

/// Board outline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Boundary {
    pub paths: Vec<BoundaryPath>,
    pub rects: Vec<BoundaryRect>,
}

impl Boundary {
    pub fn is_empty(&self) -> bool {
        self.paths.iter().all(|p| p.coordinates.len() < 2) && self.rects.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryPath {
    pub layer: String,
    pub width: f64,
    /// Flat `[x0, y0, x1, y1, ...]`
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryRect {
    pub layer: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub components: Vec<PlacementComponent>,
}

/// All placed instances of one footprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementComponent {
    pub footprint_id: String,
    pub places: Vec<Place>,
}

/// One placed instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Place {
    pub reference: String,
    pub x: f64,
    pub y: f64,
    /// `front` or `back`
    pub side: String,
    /// Degrees, counter-clockwise
    pub rotation: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Library {
    pub images: Vec<Image>,
    pub padstacks: Vec<Padstack>,
}

/// Footprint definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub id: String,
    pub pins: Vec<PinDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinDef {
    pub padstack_id: String,
    pub pin_id: String,
    pub x: f64,
    pub y: f64,
    /// Pad rotation relative to the footprint, degrees
    pub rotation: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Padstack {
    pub id: String,
    pub shapes: Vec<PadstackShape>,
}

/// One `(shape ...)` entry of a padstack; usually holds a single primitive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PadstackShape {
    pub children: Vec<ShapePrimitive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapePrimitive {
    Circle {
        layer: String,
        diameter: f64,
    },
    Rect {
        layer: String,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Polygon {
        layer: String,
        aperture_width: f64,
        coordinates: Vec<f64>,
    },
    Path {
        layer: String,
        width: f64,
        coordinates: Vec<f64>,
    },
    Unknown {
        name: String,
    },
}

impl ShapePrimitive {
    pub fn layer(&self) -> Option<&str> {
        match self {
            ShapePrimitive::Circle { layer, .. }
            | ShapePrimitive::Rect { layer, .. }
            | ShapePrimitive::Polygon { layer, .. }
            | ShapePrimitive::Path { layer, .. } => Some(layer),
            ShapePrimitive::Unknown { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub nets: Vec<NetDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetDef {
    pub name: String,
    /// `"<componentRef>-<pinId>"` strings
    pub pin_refs: Vec<String>,
}

/// A complete session (routing results) file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SesDesign {
    pub name: String,
    pub base_design: Option<String>,
    pub routes: RoutingResults,
}

/// Routed copper grouped by net
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingResults {
    pub resolution: Option<Resolution>,
    /// Padstacks the router emitted (`library_out`), mostly vias
    pub padstacks: Vec<Padstack>,
    pub nets: Vec<RoutedNet>,
}

impl RoutingResults {
    pub fn wire_count(&self) -> usize {
        self.nets.iter().map(|n| n.wires.len()).sum()
    }

    pub fn via_count(&self) -> usize {
        self.nets.iter().map(|n| n.vias.len()).sum()
    }

    /// Routed net by name, created on first use
    pub fn net_mut(&mut self, name: &str) -> &mut RoutedNet {
        let idx = match self.nets.iter().position(|n| n.name == name) {
            Some(idx) => idx,
            None => {
                self.nets.push(RoutedNet {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.nets.len() - 1
            }
        };
        &mut self.nets[idx]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutedNet {
    pub name: String,
    pub wires: Vec<Wire>,
    pub vias: Vec<ViaPlacement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wire {
    pub layer: String,
    pub width: f64,
    /// Flat `[x0, y0, x1, y1, ...]`
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViaPlacement {
    pub padstack_id: String,
    pub x: f64,
    pub y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_mut_groups_by_name() {
        let mut routes = RoutingResults::default();
        routes.net_mut("GND").wires.push(Wire::default());
        routes.net_mut("VCC").vias.push(ViaPlacement::default());
        routes.net_mut("GND").wires.push(Wire::default());

        assert_eq!(routes.nets.len(), 2);
        assert_eq!(routes.wire_count(), 2);
        assert_eq!(routes.via_count(), 1);
    }

    #[test]
    fn test_design_from_json_defaults() {
        let json = r#"{
            "resolution": {"unit": "mil", "value": 1000},
            "network": {"nets": [{"name": "GND", "pin_refs": ["R1-1", "C1-2"]}]}
        }"#;
        let design: DsnDesign = serde_json::from_str(json).unwrap();
        assert_eq!(design.resolution, Some(Resolution::new("mil", 1000.0)));
        assert!(design.boundary.is_empty());
        assert_eq!(design.network.nets[0].pin_refs.len(), 2);
    }

    #[test]
    fn test_shape_primitive_tagging() {
        let json = r#"{"kind": "circle", "layer": "F.Cu", "diameter": 600}"#;
        let prim: ShapePrimitive = serde_json::from_str(json).unwrap();
        assert_eq!(prim.layer(), Some("F.Cu"));
    }
}
