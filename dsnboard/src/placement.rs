//! Placement Resolver
//!
//! Places every footprint instance on the board: one component per placed
//! reference, one pad and one port per footprint pin, all in millimeters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{FootprintCatalog, FootprintPin, PadDefinition};
use crate::core::{ConversionContext, ConversionError, ConversionWarning, ReferenceKind, Stage};
use crate::geometry::{Layer, PadShape, Point};
use crate::parser::schema::{DsnDesign, Place};
use crate::routing::PortLocation;
use crate::transform::CoordinateTransform;

/// A placed footprint instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedComponent {
    pub component_id: String,
    pub reference: String,
    pub footprint_id: String,
    pub center: Point,
    pub rotation: f64,
    pub layer: Layer,
}

/// A placed pad together with the port that represents its contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedPad {
    pub pad_id: String,
    pub port_id: String,
    pub component_id: String,
    /// `"<reference>-<pin>"`
    pub pin_ref: String,
    pub pin_id: String,
    pub position: Point,
    /// Millimeters, already mirrored and rotated
    pub shape: PadShape,
    pub layers: Vec<Layer>,
    /// Hole diameter for plated holes, `None` for SMT pads
    pub hole_diameter: Option<f64>,
}

impl PlacedPad {
    pub fn is_plated_hole(&self) -> bool {
        self.hole_diameter.is_some()
    }

    pub fn port_location(&self) -> PortLocation {
        let (width, height) = self.shape.extent();
        PortLocation {
            port_id: self.port_id.clone(),
            x: self.position.x,
            y: self.position.y,
            width,
            height,
            shape: Some(self.shape.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlacementResult {
    pub components: Vec<PlacedComponent>,
    pub pads: Vec<PlacedPad>,
    /// Reference designator to component id
    pub ref_to_component: HashMap<String, String>,
    /// Footprint id to the ids of the components using it
    pub footprint_to_components: HashMap<String, Vec<String>>,
    /// `"<reference>-<pin>"` to port id
    pin_to_port: HashMap<String, String>,
}

impl PlacementResult {
    pub fn port_for_pin(&self, pin_ref: &str) -> Option<&str> {
        self.pin_to_port.get(pin_ref).map(|s| s.as_str())
    }

    pub fn component(&self, reference: &str) -> Option<&PlacedComponent> {
        let id = self.ref_to_component.get(reference)?;
        self.components.iter().find(|c| &c.component_id == id)
    }

    pub fn port_locations(&self) -> Vec<PortLocation> {
        self.pads.iter().map(|p| p.port_location()).collect()
    }
}

pub struct PlacementResolver<'a> {
    catalog: &'a FootprintCatalog,
    transform: CoordinateTransform,
}

impl<'a> PlacementResolver<'a> {
    pub fn new(
        catalog: &'a FootprintCatalog,
        ctx: &ConversionContext,
    ) -> Result<Self, ConversionError> {
        Ok(Self {
            catalog,
            transform: *ctx.transform(Stage::Placement)?,
        })
    }

    pub fn resolve(
        &self,
        design: &DsnDesign,
        ctx: &mut ConversionContext,
    ) -> Result<PlacementResult, ConversionError> {
        let mut result = PlacementResult::default();

        for group in &design.placement.components {
            let Some(footprint) = self.catalog.footprint(&group.footprint_id) else {
                ctx.warn(ConversionWarning::UnresolvedReference {
                    stage: Stage::Placement,
                    reference_kind: ReferenceKind::Footprint,
                    reference: group.footprint_id.clone(),
                });
                continue;
            };

            for place in &group.places {
                if result.ref_to_component.contains_key(&place.reference) {
                    tracing::warn!("Reference {} placed twice, keeping the first", place.reference);
                    continue;
                }

                let component_id = format!("pcb_component_{}", result.components.len());
                let layer = side_layer(place, ctx);

                result.components.push(PlacedComponent {
                    component_id: component_id.clone(),
                    reference: place.reference.clone(),
                    footprint_id: group.footprint_id.clone(),
                    center: self.transform.apply(place.x, place.y),
                    rotation: place.rotation,
                    layer,
                });
                result
                    .ref_to_component
                    .insert(place.reference.clone(), component_id.clone());
                result
                    .footprint_to_components
                    .entry(group.footprint_id.clone())
                    .or_default()
                    .push(component_id.clone());

                for pin in &footprint.pins {
                    let Some(def) = footprint.pad(&pin.padstack_id) else {
                        continue;
                    };
                    let pad = self.place_pad(&result, place, &component_id, layer, pin, def);
                    result
                        .pin_to_port
                        .insert(pad.pin_ref.clone(), pad.port_id.clone());
                    result.pads.push(pad);
                }
            }
        }

        tracing::debug!(
            "Placed {} components with {} pads",
            result.components.len(),
            result.pads.len()
        );

        Ok(result)
    }

    fn place_pad(
        &self,
        result: &PlacementResult,
        place: &Place,
        component_id: &str,
        layer: Layer,
        pin: &FootprintPin,
        def: &PadDefinition,
    ) -> PlacedPad {
        let mirror = layer == Layer::Bottom;
        let index = result.pads.len();

        let local = if mirror {
            Point::new(-pin.offset.x, pin.offset.y)
        } else {
            pin.offset
        };
        let world = local.rotated(place.rotation).offset(place.x, place.y);

        let shape = def
            .shape
            .posed(mirror, place.rotation + pin.rotation)
            .scaled(self.transform.scale);

        let (layers, hole_diameter, pad_id) = if def.through_hole {
            let hole = match def.size_pattern {
                Some(pattern) => pattern.hole_mm(&self.transform),
                None => shape.outer_diameter() / 2.0,
            };
            (
                vec![Layer::Top, Layer::Bottom],
                Some(hole),
                format!("pcb_plated_hole_{}", index),
            )
        } else {
            (vec![layer], None, format!("pcb_smtpad_{}", index))
        };

        PlacedPad {
            pad_id,
            port_id: format!("pcb_port_{}", index),
            component_id: component_id.to_string(),
            pin_ref: format!("{}-{}", place.reference, pin.pin_id),
            pin_id: pin.pin_id.clone(),
            position: self.transform.apply(world.x, world.y),
            shape,
            layers,
            hole_diameter,
        }
    }
}

fn side_layer(place: &Place, ctx: &mut ConversionContext) -> Layer {
    match Layer::from_name(&place.side) {
        Some(layer) => layer,
        None => {
            ctx.warn(ConversionWarning::UnknownLayer {
                name: place.side.clone(),
            });
            Layer::Top
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConversionOptions;
    use crate::parser::schema::{
        Image, Library, Padstack, PadstackShape, PinDef, PlacementComponent, Resolution,
        ShapePrimitive,
    };

    fn design() -> DsnDesign {
        let mut design = DsnDesign {
            resolution: Some(Resolution::new("mm", 1.0)),
            ..Default::default()
        };
        design.library = Library {
            images: vec![Image {
                id: "R_0603".to_string(),
                pins: vec![
                    PinDef {
                        padstack_id: "Rect".to_string(),
                        pin_id: "1".to_string(),
                        x: -1.0,
                        y: 0.0,
                        rotation: 0.0,
                    },
                    PinDef {
                        padstack_id: "Rect".to_string(),
                        pin_id: "2".to_string(),
                        x: 1.0,
                        y: 0.0,
                        rotation: 0.0,
                    },
                ],
            }],
            padstacks: vec![Padstack {
                id: "Rect".to_string(),
                shapes: vec![PadstackShape {
                    children: vec![ShapePrimitive::Rect {
                        layer: "F.Cu".to_string(),
                        x1: -0.4,
                        y1: -0.2,
                        x2: 0.4,
                        y2: 0.2,
                    }],
                }],
            }],
        };
        design.placement.components.push(PlacementComponent {
            footprint_id: "R_0603".to_string(),
            places: vec![
                Place {
                    reference: "R1".to_string(),
                    x: 10.0,
                    y: 5.0,
                    side: "front".to_string(),
                    rotation: 90.0,
                },
                Place {
                    reference: "R2".to_string(),
                    x: 0.0,
                    y: 0.0,
                    side: "back".to_string(),
                    rotation: 0.0,
                },
            ],
        });
        design
    }

    fn resolve(design: &DsnDesign) -> (PlacementResult, ConversionContext) {
        let options = ConversionOptions {
            center_board: false,
            ..Default::default()
        };
        let mut ctx = ConversionContext::new(options);
        ctx.set_transform(CoordinateTransform::for_design(design, false));
        let catalog = FootprintCatalog::build(&design.library, &mut ctx);
        let result = PlacementResolver::new(&catalog, &ctx)
            .unwrap()
            .resolve(design, &mut ctx)
            .unwrap();
        (result, ctx)
    }

    #[test]
    fn test_rotated_pin_positions() {
        let (result, _) = resolve(&design());
        let r1 = result.component("R1").unwrap();
        assert_eq!(r1.layer, Layer::Top);

        let pin1 = result.pads.iter().find(|p| p.pin_ref == "R1-1").unwrap();
        assert!(pin1.position.approx_eq(&Point::new(10.0, 4.0), 1e-9));
        // quarter turn swaps the rect sides
        assert_eq!(pin1.shape, PadShape::Rect { width: 0.4, height: 0.8 });
        assert_eq!(pin1.component_id, r1.component_id);
    }

    #[test]
    fn test_back_side_mirrors_pins() {
        let (result, _) = resolve(&design());
        let r2 = result.component("R2").unwrap();
        assert_eq!(r2.layer, Layer::Bottom);

        let pin1 = result.pads.iter().find(|p| p.pin_ref == "R2-1").unwrap();
        assert!(pin1.position.approx_eq(&Point::new(1.0, 0.0), 1e-9));
        assert_eq!(pin1.layers, vec![Layer::Bottom]);
        assert!(!pin1.is_plated_hole());
    }

    #[test]
    fn test_lookup_tables() {
        let (result, ctx) = resolve(&design());
        assert_eq!(result.components.len(), 2);
        assert_eq!(result.pads.len(), 4);
        assert_eq!(result.footprint_to_components["R_0603"].len(), 2);
        assert_eq!(result.ref_to_component["R2"], "pcb_component_1");
        assert!(result.port_for_pin("R2-2").is_some());
        assert!(result.port_for_pin("R3-1").is_none());
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_unknown_footprint_is_reported() {
        let mut design = design();
        design.placement.components[0].footprint_id = "Nope".to_string();
        let (result, ctx) = resolve(&design);
        assert!(result.components.is_empty());
        assert!(matches!(
            ctx.warnings()[0],
            ConversionWarning::UnresolvedReference {
                reference_kind: ReferenceKind::Footprint,
                ..
            }
        ));
    }

    #[test]
    fn test_requires_transform() {
        let catalog = FootprintCatalog::default();
        let ctx = ConversionContext::default();
        assert!(matches!(
            PlacementResolver::new(&catalog, &ctx),
            Err(ConversionError::MissingTransform {
                stage: Stage::Placement
            })
        ));
    }
}
