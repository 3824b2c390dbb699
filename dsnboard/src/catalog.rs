//! Footprint/Pad Catalog Builder
//!
//! Indexes footprint images by id and, per footprint, the normalized pad
//! geometry of every padstack its pins reference. All dimensions here are
//! still in design units.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{ConversionContext, ConversionWarning, ReferenceKind, Stage};
use crate::geometry::{Layer, PadShape, Point};
use crate::parser::schema::{Library, Padstack, ShapePrimitive};
use crate::transform::{CoordinateTransform, DesignUnit};

/// `outer:hole` size pattern found in padstack names such as
/// `Via[0-1]_600:300_um`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizePattern {
    pub outer: f64,
    pub hole: f64,
    /// Unit named right after the pattern; design units when absent
    pub unit: Option<DesignUnit>,
}

impl SizePattern {
    /// Find the first `<number>:<number>` pair in a padstack name.
    pub fn parse(name: &str) -> Option<SizePattern> {
        let bytes = name.as_bytes();
        let is_num = |b: u8| b.is_ascii_digit() || b == b'.';

        for (i, &b) in bytes.iter().enumerate() {
            if b != b':' {
                continue;
            }
            let mut start = i;
            while start > 0 && is_num(bytes[start - 1]) {
                start -= 1;
            }
            let mut end = i + 1;
            while end < bytes.len() && is_num(bytes[end]) {
                end += 1;
            }
            let (Ok(outer), Ok(hole)) = (
                name[start..i].parse::<f64>(),
                name[i + 1..end].parse::<f64>(),
            ) else {
                continue;
            };
            let unit = name[end..]
                .strip_prefix('_')
                .and_then(|rest| {
                    let token: String =
                        rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                    DesignUnit::parse(&token)
                });
            return Some(SizePattern { outer, hole, unit });
        }
        None
    }

    fn to_mm(&self, value: f64, transform: &CoordinateTransform) -> f64 {
        match self.unit {
            Some(unit) => value * unit.to_mm(),
            None => transform.length(value),
        }
    }

    pub fn outer_mm(&self, transform: &CoordinateTransform) -> f64 {
        self.to_mm(self.outer, transform)
    }

    pub fn hole_mm(&self, transform: &CoordinateTransform) -> f64 {
        self.to_mm(self.hole, transform)
    }
}

/// Normalized geometry of one padstack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadDefinition {
    pub padstack_id: String,
    /// Shape in design units, relative to the pin position
    pub shape: PadShape,
    /// Copper on both outer layers: realized as a plated hole
    pub through_hole: bool,
    pub size_pattern: Option<SizePattern>,
}

impl PadDefinition {
    /// Build from a padstack; the flag is true when the fallback circle had
    /// to be used.
    pub fn from_padstack(padstack: &Padstack, fallback_diameter: f64) -> (PadDefinition, bool) {
        let primitives = padstack.shapes.iter().flat_map(|s| s.children.iter());

        let mut layers = Vec::new();
        let mut wildcard = false;
        for prim in primitives.clone() {
            match prim.layer() {
                Some(name) if name == "signal" || name == "*" => wildcard = true,
                Some(name) => {
                    if let Some(layer) = Layer::from_name(name) {
                        if !layers.contains(&layer) {
                            layers.push(layer);
                        }
                    }
                }
                None => {}
            }
        }

        let recognized = primitives.filter_map(normalize_primitive).next();
        let fallback = recognized.is_none();
        let shape = recognized.unwrap_or(PadShape::Circle {
            diameter: fallback_diameter,
        });

        (
            PadDefinition {
                padstack_id: padstack.id.clone(),
                shape,
                through_hole: wildcard || layers.len() >= 2,
                size_pattern: SizePattern::parse(&padstack.id),
            },
            fallback,
        )
    }
}

/// First recognized primitive in declaration order wins; the order of the
/// variants in the match carries no priority.
fn normalize_primitive(prim: &ShapePrimitive) -> Option<PadShape> {
    match prim {
        ShapePrimitive::Circle { diameter, .. } if *diameter > 0.0 => Some(PadShape::Circle {
            diameter: *diameter,
        }),
        ShapePrimitive::Rect { x1, y1, x2, y2, .. } => Some(PadShape::Rect {
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }),
        ShapePrimitive::Polygon { coordinates, .. } if coordinates.len() >= 6 => {
            Some(PadShape::Polygon {
                points: coordinates
                    .chunks_exact(2)
                    .map(|xy| Point::new(xy[0], xy[1]))
                    .collect(),
            })
        }
        ShapePrimitive::Path {
            width, coordinates, ..
        } if coordinates.len() >= 2 => {
            // Single-point paths degenerate to a round pad of the path width
            let n = coordinates.len();
            let (dx, dy) = if n >= 4 {
                (
                    (coordinates[n - 2] - coordinates[0]).abs(),
                    (coordinates[n - 1] - coordinates[1]).abs(),
                )
            } else {
                (0.0, 0.0)
            };
            Some(PadShape::Pill {
                width: dx + width,
                height: dy + width,
            })
        }
        _ => None,
    }
}

/// One pin of a footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintPin {
    pub pin_id: String,
    pub padstack_id: String,
    /// Offset from the footprint origin, design units
    pub offset: Point,
    pub rotation: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FootprintEntry {
    pub id: String,
    pub pins: Vec<FootprintPin>,
    /// Pad geometry by padstack id, for the padstacks this footprint uses
    pub pads: HashMap<String, PadDefinition>,
}

impl FootprintEntry {
    pub fn pad(&self, padstack_id: &str) -> Option<&PadDefinition> {
        self.pads.get(padstack_id)
    }
}

/// Footprints and padstacks of one design
#[derive(Debug, Clone, Default)]
pub struct FootprintCatalog {
    footprints: HashMap<String, FootprintEntry>,
    padstacks: HashMap<String, PadDefinition>,
}

impl FootprintCatalog {
    pub fn build(library: &Library, ctx: &mut ConversionContext) -> Self {
        let fallback_diameter = ctx.options.fallback_pad_diameter;
        let mut catalog = Self::default();

        for padstack in &library.padstacks {
            let (def, used_fallback) = PadDefinition::from_padstack(padstack, fallback_diameter);
            if used_fallback {
                ctx.warn(ConversionWarning::FallbackShape {
                    padstack: padstack.id.clone(),
                });
            }
            catalog.padstacks.insert(padstack.id.clone(), def);
        }

        for image in &library.images {
            let mut entry = FootprintEntry {
                id: image.id.clone(),
                ..Default::default()
            };

            for pin in &image.pins {
                let Some(def) = catalog.padstacks.get(&pin.padstack_id) else {
                    ctx.warn(ConversionWarning::UnresolvedReference {
                        stage: Stage::Catalog,
                        reference_kind: ReferenceKind::Padstack,
                        reference: format!(
                            "{} (pin {} of {})",
                            pin.padstack_id, pin.pin_id, image.id
                        ),
                    });
                    continue;
                };
                entry
                    .pads
                    .entry(pin.padstack_id.clone())
                    .or_insert_with(|| def.clone());
                entry.pins.push(FootprintPin {
                    pin_id: pin.pin_id.clone(),
                    padstack_id: pin.padstack_id.clone(),
                    offset: Point::new(pin.x, pin.y),
                    rotation: pin.rotation,
                });
            }

            catalog.footprints.insert(image.id.clone(), entry);
        }

        tracing::debug!(
            "Catalog: {} footprints, {} padstacks",
            catalog.footprints.len(),
            catalog.padstacks.len()
        );

        catalog
    }

    /// Add padstacks that only the router knows about (session
    /// `library_out`); existing entries win.
    pub fn merge_padstacks(&mut self, padstacks: &[Padstack], fallback_diameter: f64) {
        for padstack in padstacks {
            self.padstacks
                .entry(padstack.id.clone())
                .or_insert_with(|| PadDefinition::from_padstack(padstack, fallback_diameter).0);
        }
    }

    pub fn footprint(&self, id: &str) -> Option<&FootprintEntry> {
        self.footprints.get(id)
    }

    pub fn padstack(&self, id: &str) -> Option<&PadDefinition> {
        self.padstacks.get(id)
    }
}
