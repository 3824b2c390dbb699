//! Segment Extractor
//!
//! Flattens routing results into per-net [`Segment`]s and [`ViaRecord`]s in
//! board millimeters.

use std::collections::HashSet;

use crate::catalog::{FootprintCatalog, SizePattern};
use crate::core::{ConversionContext, ConversionError, ConversionWarning, Stage};
use crate::geometry::{Layer, Point};
use crate::parser::schema::{RoutedNet, RoutingResults, ViaPlacement, Wire};
use crate::routing::{Segment, ViaRecord};
use crate::transform::CoordinateTransform;

/// Segments and vias of one net, in input order
#[derive(Debug, Clone, Default)]
pub struct ExtractedNet {
    pub name: String,
    pub segments: Vec<Segment>,
    pub vias: Vec<ViaRecord>,
}

pub struct SegmentExtractor<'a> {
    catalog: &'a FootprintCatalog,
    transform: CoordinateTransform,
    warned_layers: HashSet<String>,
}

impl<'a> SegmentExtractor<'a> {
    /// Extractor for routing results overlaid on the board resolved in `ctx`.
    pub fn new(
        catalog: &'a FootprintCatalog,
        routes: &RoutingResults,
        ctx: &ConversionContext,
    ) -> Result<Self, ConversionError> {
        let board = ctx.transform(Stage::Extraction)?;
        Ok(Self {
            catalog,
            transform: CoordinateTransform::for_overlay(routes.resolution.as_ref(), board),
            warned_layers: HashSet::new(),
        })
    }

    pub fn extract(
        &mut self,
        routes: &RoutingResults,
        ctx: &mut ConversionContext,
    ) -> Vec<ExtractedNet> {
        routes
            .nets
            .iter()
            .map(|net| self.extract_net(net, ctx))
            .collect()
    }

    fn extract_net(&mut self, net: &RoutedNet, ctx: &mut ConversionContext) -> ExtractedNet {
        let mut extracted = ExtractedNet {
            name: net.name.clone(),
            ..Default::default()
        };

        for (idx, wire) in net.wires.iter().enumerate() {
            match self.segment(&net.name, wire, ctx) {
                Some(segment) => extracted.segments.push(segment),
                None => ctx.warn(ConversionWarning::MalformedPrimitive {
                    net: net.name.clone(),
                    detail: format!(
                        "wire {} has {} coordinates, need an even count of at least 4",
                        idx,
                        wire.coordinates.len()
                    ),
                }),
            }
        }

        for via in &net.vias {
            extracted.vias.push(self.via(&net.name, via, ctx));
        }

        tracing::debug!(
            "Net {}: {} segments, {} vias",
            net.name,
            extracted.segments.len(),
            extracted.vias.len()
        );

        extracted
    }

    fn segment(&mut self, net: &str, wire: &Wire, ctx: &mut ConversionContext) -> Option<Segment> {
        let coords = &wire.coordinates;
        if coords.len() < 4 || coords.len() % 2 != 0 {
            return None;
        }

        let points: Vec<Point> = coords
            .chunks_exact(2)
            .map(|xy| self.transform.apply(xy[0], xy[1]))
            .collect();

        Some(Segment::new(
            net,
            self.layer(&wire.layer, ctx),
            self.transform.length(wire.width),
            points,
        ))
    }

    fn layer(&mut self, name: &str, ctx: &mut ConversionContext) -> Layer {
        match Layer::from_name(name) {
            Some(layer) => layer,
            None => {
                if self.warned_layers.insert(name.to_string()) {
                    ctx.warn(ConversionWarning::UnknownLayer {
                        name: name.to_string(),
                    });
                }
                Layer::Top
            }
        }
    }

    fn via(&self, net: &str, via: &ViaPlacement, ctx: &ConversionContext) -> ViaRecord {
        let (outer_diameter, hole_diameter) = self.via_size(&via.padstack_id, ctx);
        ViaRecord {
            net: net.to_string(),
            position: self.transform.apply(via.x, via.y),
            from_layer: Layer::Top,
            to_layer: Layer::Bottom,
            padstack_id: via.padstack_id.clone(),
            outer_diameter,
            hole_diameter,
        }
    }

    /// Outer and hole diameter in millimeters: name pattern first, then the
    /// padstack geometry, then the configured defaults.
    fn via_size(&self, padstack_id: &str, ctx: &ConversionContext) -> (f64, f64) {
        if let Some(pattern) = SizePattern::parse(padstack_id) {
            return (
                pattern.outer_mm(&self.transform),
                pattern.hole_mm(&self.transform),
            );
        }

        if let Some(def) = self.catalog.padstack(padstack_id) {
            let outer = self.transform.length(def.shape.outer_diameter());
            if outer > 0.0 {
                return (outer, outer / 2.0);
            }
        }

        (
            ctx.options.default_via_outer_mm,
            ctx.options.default_via_hole_mm,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConversionOptions;
    use crate::parser::schema::{Padstack, PadstackShape, Resolution, ShapePrimitive};

    fn ctx() -> ConversionContext {
        let mut ctx = ConversionContext::new(ConversionOptions::default());
        ctx.set_transform(CoordinateTransform::scale_only(0.001));
        ctx
    }

    fn routes() -> RoutingResults {
        let mut routes = RoutingResults {
            resolution: Some(Resolution::new("um", 1.0)),
            ..Default::default()
        };
        let net = routes.net_mut("SIG");
        net.wires.push(Wire {
            layer: "F.Cu".to_string(),
            width: 250.0,
            coordinates: vec![0.0, 0.0, 1000.0, 0.0, 1000.0, 1000.0],
        });
        net.wires.push(Wire {
            layer: "2".to_string(),
            width: 250.0,
            coordinates: vec![1000.0, 1000.0, 2000.0],
        });
        net.wires.push(Wire {
            layer: "In1.Cu".to_string(),
            width: 250.0,
            coordinates: vec![0.0, 0.0, 0.0, 500.0],
        });
        net.vias.push(ViaPlacement {
            padstack_id: "Via[0-1]_800:400_um".to_string(),
            x: 1000.0,
            y: 1000.0,
        });
        net.vias.push(ViaPlacement {
            padstack_id: "via_round".to_string(),
            x: 0.0,
            y: 500.0,
        });
        net.vias.push(ViaPlacement {
            padstack_id: "mystery".to_string(),
            x: 0.0,
            y: 0.0,
        });
        routes
    }

    #[test]
    fn test_extracts_segments_in_mm() {
        let mut ctx = ctx();
        let routes = routes();
        let catalog = FootprintCatalog::default();
        let mut extractor = SegmentExtractor::new(&catalog, &routes, &ctx).unwrap();
        let nets = extractor.extract(&routes, &mut ctx);

        assert_eq!(nets.len(), 1);
        let net = &nets[0];
        assert_eq!(net.segments.len(), 2);
        assert_eq!(net.segments[0].points.len(), 3);
        assert!((net.segments[0].width - 0.25).abs() < 1e-12);
        assert!(net.segments[0].end().approx_eq(&Point::new(1.0, 1.0), 1e-9));
        // unknown inner layer falls back to top
        assert_eq!(net.segments[1].layer, Layer::Top);

        let malformed = ctx
            .warnings()
            .iter()
            .filter(|w| matches!(w, ConversionWarning::MalformedPrimitive { .. }))
            .count();
        assert_eq!(malformed, 1);
        assert!(ctx
            .warnings()
            .iter()
            .any(|w| matches!(w, ConversionWarning::UnknownLayer { name } if name == "In1.Cu")));
    }

    #[test]
    fn test_via_sizes() {
        let mut ctx = ctx();
        let routes = routes();
        let mut catalog = FootprintCatalog::default();
        catalog.merge_padstacks(
            &[Padstack {
                id: "via_round".to_string(),
                shapes: vec![PadstackShape {
                    children: vec![ShapePrimitive::Circle {
                        layer: "signal".to_string(),
                        diameter: 500.0,
                    }],
                }],
            }],
            1000.0,
        );
        let mut extractor = SegmentExtractor::new(&catalog, &routes, &ctx).unwrap();
        let vias = extractor.extract(&routes, &mut ctx).remove(0).vias;

        assert!((vias[0].outer_diameter - 0.8).abs() < 1e-12);
        assert!((vias[0].hole_diameter - 0.4).abs() < 1e-12);
        assert!((vias[1].outer_diameter - 0.5).abs() < 1e-12);
        assert!((vias[1].hole_diameter - 0.25).abs() < 1e-12);
        assert_eq!(vias[2].outer_diameter, 0.6);
        assert_eq!(vias[2].hole_diameter, 0.3);
        assert_eq!(vias[2].from_layer, Layer::Top);
        assert_eq!(vias[2].to_layer, Layer::Bottom);
    }

    #[test]
    fn test_requires_transform() {
        let catalog = FootprintCatalog::default();
        let routes = RoutingResults::default();
        let ctx = ConversionContext::default();
        assert!(matches!(
            SegmentExtractor::new(&catalog, &routes, &ctx),
            Err(ConversionError::MissingTransform {
                stage: Stage::Extraction
            })
        ));
    }
}
