//! Conversion core shared by every pipeline stage: error taxonomy,
//! accumulated warnings, options, and the per-run context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::geometry::DEFAULT_EPSILON_MM;
use crate::parser::DsnParseError;
use crate::transform::CoordinateTransform;

/// Pipeline stage, used to identify where a fatal error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Catalog,
    Placement,
    Connectivity,
    Extraction,
    Stitching,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Catalog => "footprint catalog",
            Stage::Placement => "placement",
            Stage::Connectivity => "connectivity",
            Stage::Extraction => "segment extraction",
            Stage::Stitching => "stitching",
            Stage::Assembly => "assembly",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{stage} stage ran before the coordinate transform was resolved")]
    MissingTransform { stage: Stage },
    #[error("{stage} stage exceeded its iteration limit of {limit} on net {net}")]
    IterationLimitExceeded {
        stage: Stage,
        net: String,
        limit: usize,
    },
}

impl From<DsnParseError> for ConversionError {
    fn from(e: DsnParseError) -> Self {
        match e {
            DsnParseError::Io(io) => ConversionError::Io(io),
            other => ConversionError::Parse(other.to_string()),
        }
    }
}

/// What kind of identifier failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    PinRef,
    Footprint,
    Padstack,
    Net,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::PinRef => write!(f, "pin reference"),
            ReferenceKind::Footprint => write!(f, "footprint"),
            ReferenceKind::Padstack => write!(f, "padstack"),
            ReferenceKind::Net => write!(f, "net"),
        }
    }
}

/// Recoverable data-quality problem found during a conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    UnresolvedReference {
        stage: Stage,
        reference_kind: ReferenceKind,
        reference: String,
    },
    MalformedPrimitive {
        net: String,
        detail: String,
    },
    FallbackShape {
        padstack: String,
    },
    UnknownLayer {
        name: String,
    },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionWarning::UnresolvedReference {
                stage,
                reference_kind,
                reference,
            } => write!(f, "{}: unresolved {} '{}'", stage, reference_kind, reference),
            ConversionWarning::MalformedPrimitive { net, detail } => {
                write!(f, "malformed primitive on net '{}': {}", net, detail)
            }
            ConversionWarning::FallbackShape { padstack } => {
                write!(f, "padstack '{}' has no recognized shape, using fallback circle", padstack)
            }
            ConversionWarning::UnknownLayer { name } => {
                write!(f, "layer '{}' is not an outer copper layer, treating as top", name)
            }
        }
    }
}

/// Stitching knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchOptions {
    /// Endpoint matching tolerance in millimeters
    pub epsilon_mm: f64,
    /// Extra loop steps allowed per net on top of twice its segment count
    pub max_iterations: usize,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            epsilon_mm: DEFAULT_EPSILON_MM,
            max_iterations: 1000,
        }
    }
}

/// Options for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Translate the board so its outline is centered on the origin
    pub center_board: bool,
    pub stitch: StitchOptions,
    /// Grow pad footprints by this much when matching trace ends (mm)
    pub pad_slack_mm: f64,
    /// Write hanging chains to the board (flagged) instead of only
    /// reporting them
    pub keep_hanging_traces: bool,
    /// Diameter used for padstacks without a recognized shape (design units)
    pub fallback_pad_diameter: f64,
    pub default_via_outer_mm: f64,
    pub default_via_hole_mm: f64,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            center_board: true,
            stitch: StitchOptions::default(),
            pad_slack_mm: 0.01,
            keep_hanging_traces: true,
            fallback_pad_diameter: 1000.0,
            default_via_outer_mm: 0.6,
            default_via_hole_mm: 0.3,
        }
    }
}

impl ConversionOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Counts describing one conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub components: usize,
    pub pads: usize,
    pub nets: usize,
    pub connections: usize,
    pub raw_segments: usize,
    pub traces: usize,
    pub hanging_traces: usize,
    pub vias: usize,
    pub warnings: usize,
}

/// Finished board plus everything the caller may want to inspect
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub board: Board,
    pub warnings: Vec<ConversionWarning>,
    pub stats: ConversionStats,
}

impl ConversionResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn unresolved_references(&self) -> impl Iterator<Item = &ConversionWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ConversionWarning::UnresolvedReference { .. }))
    }
}

/// Mutable state threaded through the stages of one run
#[derive(Debug, Default)]
pub struct ConversionContext {
    pub options: ConversionOptions,
    transform: Option<CoordinateTransform>,
    warnings: Vec<ConversionWarning>,
}

impl ConversionContext {
    pub fn new(options: ConversionOptions) -> Self {
        Self {
            options,
            transform: None,
            warnings: Vec::new(),
        }
    }

    pub fn set_transform(&mut self, transform: CoordinateTransform) {
        self.transform = Some(transform);
    }

    /// The resolved transform, or `MissingTransform` naming the stage that
    /// asked for it.
    pub fn transform(&self, stage: Stage) -> Result<&CoordinateTransform, ConversionError> {
        self.transform
            .as_ref()
            .ok_or(ConversionError::MissingTransform { stage })
    }

    pub fn warn(&mut self, warning: ConversionWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ConversionWarning> {
        self.warnings
    }
}
