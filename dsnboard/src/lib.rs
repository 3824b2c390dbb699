//! dsnboard - Specctra DSN/SES to board graph conversion
//!
//! This library turns a Specctra design file (placement, footprints, nets)
//! and optionally the autorouter's session file into a flat board model:
//! components, pads, ports, nets, traces and vias in millimeters. Routed
//! micro-segments are stitched into maximal traces and attached to the pads
//! they start and end on.
//!
//! # Quick Start
//!
//! ```no_run
//! use dsnboard::{BoardAssembler, ConversionOptions};
//! use std::path::Path;
//!
//! let result = BoardAssembler::convert_files(
//!     Path::new("board.dsn"),
//!     Some(Path::new("board.ses")),
//!     ConversionOptions::default(),
//! ).unwrap();
//!
//! for trace in result.board.traces() {
//!     println!("{} {:.3}mm", trace.pcb_trace_id, trace.trace_length);
//! }
//! for warning in &result.warnings {
//!     println!("warning: {}", warning);
//! }
//! ```
//!
//! # Features
//!
//! - **Loaders**: DSN and SES text into a typed tree
//! - **Placement**: rotated and mirrored pads, plated holes, ports
//! - **Stitching**: tolerance-keyed endpoint merging with via-gated layer changes
//! - **Board graph**: petgraph queries over the converted board

pub mod assembler;
pub mod board;
pub mod catalog;
pub mod connectivity;
pub mod core;
pub mod geometry;
pub mod parser;
pub mod placement;
pub mod routing;
pub mod transform;

// Re-export main types
pub use assembler::BoardAssembler;
pub use board::{Board, BoardElement, BoardGraph};
pub use crate::core::{
    ConversionContext, ConversionError, ConversionOptions, ConversionResult, ConversionStats,
    ConversionWarning, Stage, StitchOptions,
};
pub use geometry::{Layer, PadShape, Point};
pub use parser::dsn::DsnParser;
pub use parser::schema::{DsnDesign, RoutingResults, SesDesign};
pub use parser::ses::SesParser;
pub use routing::{RoutePoint, Segment, StitchedTrace, Stitcher, ViaRecord};
pub use transform::CoordinateTransform;

/// Parse a DSN file (convenience wrapper).
pub fn parse_dsn(path: &std::path::Path) -> Result<DsnDesign, ConversionError> {
    DsnParser::parse_dsn(path).map_err(ConversionError::from)
}

/// Parse a SES file (convenience wrapper).
pub fn parse_ses(path: &std::path::Path) -> Result<SesDesign, ConversionError> {
    SesParser::parse_ses(path).map_err(ConversionError::from)
}

/// Convert a DSN file with default options (convenience wrapper).
pub fn convert_dsn(path: &std::path::Path) -> Result<ConversionResult, ConversionError> {
    BoardAssembler::convert_files(path, None, ConversionOptions::default())
}

/// Convert a DSN file overlaid with a SES file, with default options
/// (convenience wrapper).
pub fn convert_dsn_with_session(
    dsn: &std::path::Path,
    ses: &std::path::Path,
) -> Result<ConversionResult, ConversionError> {
    BoardAssembler::convert_files(dsn, Some(ses), ConversionOptions::default())
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Board, BoardAssembler, BoardElement, BoardGraph, ConversionError, ConversionOptions,
        ConversionResult, ConversionWarning, Layer, Point, RoutePoint,
    };
}
