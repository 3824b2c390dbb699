//! Specctra DSN Parser
//!
//! Reads Specctra design files (.dsn) as exported by KiCad and other
//! autorouter front ends into the typed [`DsnDesign`] tree.
//!
//! Key format details:
//! - Coordinates are integers or decimals in design units; the `(resolution
//!   <unit> <n>)` element says how many design units make one unit
//! - Footprints are `(image ...)` entries in the `(library ...)` section and
//!   reference `(padstack ...)` definitions by name
//! - Pin references in `(network ...)` are `<ref>-<pin>` strings
//! - Pre-routed copper may appear in a `(wiring ...)` section

use std::path::Path;

use thiserror::Error;

use crate::parser::schema::*;
use crate::parser::sexp::{ParseError, SExp, SExpParser};

#[derive(Debug, Error)]
pub enum DsnParseError {
    #[error("S-expression parse error: {0}")]
    SExpParse(#[from] ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Parser for Specctra design files
pub struct DsnParser;

impl DsnParser {
    /// Parse a design file from disk
    pub fn parse_dsn(path: &Path) -> Result<DsnDesign, DsnParseError> {
        let content = std::fs::read_to_string(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::parse_dsn_str(&content, filename)
    }

    /// Parse a design from text. `filename` is used when the file does not
    /// name itself.
    pub fn parse_dsn_str(content: &str, filename: &str) -> Result<DsnDesign, DsnParseError> {
        let mut parser = SExpParser::new(content);
        let root = parser.parse()?;

        match root.tag() {
            Some("pcb") => {}
            Some(other) => {
                return Err(DsnParseError::InvalidFormat(format!(
                    "Expected pcb, found {}",
                    other
                )))
            }
            None => {
                return Err(DsnParseError::InvalidFormat(
                    "Expected (pcb ...) root".to_string(),
                ))
            }
        }

        let name = root
            .args()
            .first()
            .and_then(|a| a.as_atom())
            .map(|s| s.to_string())
            .unwrap_or_else(|| filename.to_string());

        let mut design = DsnDesign {
            name,
            resolution: root.find("resolution").and_then(parse_resolution),
            ..Default::default()
        };

        for item in root.args() {
            match item.tag() {
                Some("structure") => {
                    design.boundary = Self::parse_structure(item);
                }
                Some("placement") => {
                    design.placement = Self::parse_placement(item);
                }
                Some("library") => {
                    design.library = Self::parse_library(item);
                }
                Some("network") => {
                    design.network = Self::parse_network(item);
                }
                Some("wiring") => {
                    design.wiring = Some(Self::parse_wiring(item));
                }
                _ => {
                    // parser, unit, resolution and vendor sections
                }
            }
        }

        tracing::debug!(
            "Parsed design {}: {} footprints, {} padstacks, {} nets",
            design.name,
            design.library.images.len(),
            design.library.padstacks.len(),
            design.network.nets.len()
        );

        Ok(design)
    }

    fn parse_structure(sexp: &SExp) -> Boundary {
        let mut boundary = Boundary::default();

        for b in sexp.find_all("boundary") {
            for shape in b.args() {
                match shape.tag() {
                    Some("path") | Some("polyline_path") => {
                        if let Ok((layer, width, coordinates)) = parse_path_args(shape) {
                            boundary.paths.push(BoundaryPath {
                                layer,
                                width,
                                coordinates,
                            });
                        }
                    }
                    Some("rect") => match parse_rect_args(shape) {
                        Ok((layer, [x1, y1, x2, y2])) => {
                            boundary.rects.push(BoundaryRect {
                                layer,
                                x1,
                                y1,
                                x2,
                                y2,
                            });
                        }
                        Err(e) => tracing::warn!("Skipping boundary rect: {}", e),
                    },
                    _ => {}
                }
            }
        }

        boundary
    }

    fn parse_placement(sexp: &SExp) -> Placement {
        let mut placement = Placement::default();

        for comp in sexp.find_all("component") {
            let Some(footprint_id) = comp.leading_atoms().first().map(|s| s.to_string()) else {
                continue;
            };

            let mut places = Vec::new();
            for place in comp.find_all("place") {
                match Self::parse_place(place) {
                    Ok(p) => places.push(p),
                    Err(e) => tracing::warn!("Skipping place in {}: {}", footprint_id, e),
                }
            }

            placement.components.push(PlacementComponent {
                footprint_id,
                places,
            });
        }

        placement
    }

    fn parse_place(sexp: &SExp) -> Result<Place, DsnParseError> {
        let atoms = sexp.leading_atoms();
        let reference = atoms
            .first()
            .ok_or_else(|| DsnParseError::MissingField("place reference".to_string()))?
            .to_string();
        let x = number_at(&atoms, 1, "place x")?;
        let y = number_at(&atoms, 2, "place y")?;
        let side = atoms.get(3).copied().unwrap_or("front").to_string();
        let rotation = match atoms.get(4) {
            Some(_) => number_at(&atoms, 4, "place rotation")?,
            None => 0.0,
        };

        Ok(Place {
            reference,
            x,
            y,
            side,
            rotation,
        })
    }

    fn parse_library(sexp: &SExp) -> Library {
        let mut library = Library::default();

        for image in sexp.find_all("image") {
            let Some(id) = image.leading_atoms().first().map(|s| s.to_string()) else {
                continue;
            };
            let mut pins = Vec::new();
            for pin in image.find_all("pin") {
                match Self::parse_pin(pin) {
                    Ok(p) => pins.push(p),
                    Err(e) => tracing::warn!("Skipping pin in image {}: {}", id, e),
                }
            }
            library.images.push(Image { id, pins });
        }

        for padstack in sexp.find_all("padstack") {
            if let Some(ps) = parse_padstack(padstack) {
                library.padstacks.push(ps);
            }
        }

        library
    }

    /// `(pin <padstack> [(rotate <deg>)] <pin_id> <x> <y>)`
    fn parse_pin(sexp: &SExp) -> Result<PinDef, DsnParseError> {
        let mut atoms = Vec::new();
        let mut rotation = 0.0;

        for arg in sexp.args() {
            match arg {
                SExp::Atom(a) => atoms.push(a.as_str()),
                SExp::List(_) if arg.tag() == Some("rotate") => {
                    rotation = arg.args().first().and_then(|v| v.as_f64()).unwrap_or(0.0);
                }
                SExp::List(_) => {}
            }
        }

        if atoms.len() < 4 {
            return Err(DsnParseError::InvalidFormat(format!(
                "pin needs padstack, id and position: {}",
                sexp
            )));
        }

        Ok(PinDef {
            padstack_id: atoms[0].to_string(),
            pin_id: atoms[1].to_string(),
            x: number_at(&atoms, 2, "pin x")?,
            y: number_at(&atoms, 3, "pin y")?,
            rotation,
        })
    }

    fn parse_network(sexp: &SExp) -> Network {
        let mut network = Network::default();

        for net in sexp.find_all("net") {
            let Some(name) = net.leading_atoms().first().map(|s| s.to_string()) else {
                continue;
            };
            let pin_refs = net
                .find_all("pins")
                .flat_map(|pins| pins.leading_atoms())
                .map(|s| s.to_string())
                .collect();
            network.nets.push(NetDef { name, pin_refs });
        }

        network
    }

    /// `(wiring (wire (path ...) (net N)) (via <padstack> x y (net N)))`
    fn parse_wiring(sexp: &SExp) -> RoutingResults {
        let mut routes = RoutingResults::default();

        for item in sexp.args() {
            match item.tag() {
                Some("wire") => {
                    let net = item.value_of("net").unwrap_or_default().to_string();
                    match parse_wire(item) {
                        Ok(Some(wire)) => routes.net_mut(&net).wires.push(wire),
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Skipping wire on net {}: {}", net, e),
                    }
                }
                Some("via") => {
                    let net = item.value_of("net").unwrap_or_default().to_string();
                    match parse_via(item) {
                        Ok(via) => routes.net_mut(&net).vias.push(via),
                        Err(e) => tracing::warn!("Skipping via on net {}: {}", net, e),
                    }
                }
                _ => {}
            }
        }

        routes
    }
}

/// `(resolution <unit> <value>)`
pub(crate) fn parse_resolution(sexp: &SExp) -> Option<Resolution> {
    let atoms = sexp.leading_atoms();
    let unit = atoms.first()?.to_string();
    let value = atoms.get(1).and_then(|v| v.parse().ok()).unwrap_or(1.0);
    Some(Resolution { unit, value })
}

/// `(padstack <id> (shape <primitive>)...)`
pub(crate) fn parse_padstack(sexp: &SExp) -> Option<Padstack> {
    let id = sexp.leading_atoms().first()?.to_string();
    let shapes = sexp
        .find_all("shape")
        .map(|shape| PadstackShape {
            children: shape
                .args()
                .iter()
                .filter(|c| c.as_list().is_some())
                .map(parse_shape_primitive)
                .collect(),
        })
        .collect();
    Some(Padstack { id, shapes })
}

fn parse_shape_primitive(sexp: &SExp) -> ShapePrimitive {
    let tag = sexp.tag().unwrap_or_default();
    let unknown = || ShapePrimitive::Unknown {
        name: tag.to_string(),
    };

    match tag {
        "circle" => {
            let atoms = sexp.leading_atoms();
            match (atoms.first(), number_at(&atoms, 1, "circle diameter")) {
                (Some(layer), Ok(diameter)) => ShapePrimitive::Circle {
                    layer: layer.to_string(),
                    diameter,
                },
                _ => unknown(),
            }
        }
        "rect" => match parse_rect_args(sexp) {
            Ok((layer, [x1, y1, x2, y2])) => ShapePrimitive::Rect {
                layer,
                x1,
                y1,
                x2,
                y2,
            },
            Err(_) => unknown(),
        },
        "polygon" => match parse_path_args(sexp) {
            Ok((layer, aperture_width, coordinates)) => ShapePrimitive::Polygon {
                layer,
                aperture_width,
                coordinates,
            },
            Err(_) => unknown(),
        },
        "path" => match parse_path_args(sexp) {
            Ok((layer, width, coordinates)) => ShapePrimitive::Path {
                layer,
                width,
                coordinates,
            },
            Err(_) => unknown(),
        },
        _ => unknown(),
    }
}

/// `(wire (path <layer> <width> x y ...) ...)`; `Ok(None)` for wire kinds
/// other than straight paths (arcs are not carried).
pub(crate) fn parse_wire(sexp: &SExp) -> Result<Option<Wire>, DsnParseError> {
    let Some(path) = sexp
        .find("path")
        .or_else(|| sexp.find("polyline_path"))
    else {
        return Ok(None);
    };
    let (layer, width, coordinates) = parse_path_args(path)?;
    Ok(Some(Wire {
        layer,
        width,
        coordinates,
    }))
}

/// `(via <padstack> <x> <y> ...)`
pub(crate) fn parse_via(sexp: &SExp) -> Result<ViaPlacement, DsnParseError> {
    let atoms = sexp.leading_atoms();
    let padstack_id = atoms
        .first()
        .ok_or_else(|| DsnParseError::MissingField("via padstack".to_string()))?
        .to_string();
    Ok(ViaPlacement {
        padstack_id,
        x: number_at(&atoms, 1, "via x")?,
        y: number_at(&atoms, 2, "via y")?,
    })
}

/// `(<tag> <layer> <width> x0 y0 x1 y1 ...)`; coordinate count is not
/// validated here so malformed wires reach the segment extractor.
fn parse_path_args(sexp: &SExp) -> Result<(String, f64, Vec<f64>), DsnParseError> {
    let atoms = sexp.leading_atoms();
    let layer = atoms
        .first()
        .ok_or_else(|| DsnParseError::MissingField("path layer".to_string()))?
        .to_string();
    let width = number_at(&atoms, 1, "path width")?;
    let coordinates = atoms
        .iter()
        .skip(2)
        .map(|a| {
            a.parse::<f64>()
                .map_err(|_| DsnParseError::InvalidFormat(format!("bad coordinate '{}'", a)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((layer, width, coordinates))
}

/// `(rect <layer> x1 y1 x2 y2)`
fn parse_rect_args(sexp: &SExp) -> Result<(String, [f64; 4]), DsnParseError> {
    let atoms = sexp.leading_atoms();
    let layer = atoms
        .first()
        .ok_or_else(|| DsnParseError::MissingField("rect layer".to_string()))?
        .to_string();
    Ok((
        layer,
        [
            number_at(&atoms, 1, "rect x1")?,
            number_at(&atoms, 2, "rect y1")?,
            number_at(&atoms, 3, "rect x2")?,
            number_at(&atoms, 4, "rect y2")?,
        ],
    ))
}

fn number_at(atoms: &[&str], idx: usize, field: &str) -> Result<f64, DsnParseError> {
    let raw = atoms
        .get(idx)
        .ok_or_else(|| DsnParseError::MissingField(field.to_string()))?;
    raw.parse()
        .map_err(|_| DsnParseError::InvalidFormat(format!("{} is not a number: {}", field, raw)))
}
