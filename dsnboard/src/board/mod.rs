//! Produced board model: the flat element store and a graph view over it.

pub mod graph;
pub mod schema;

pub use graph::{BoardEdge, BoardGraph, BoardGraphStats, BoardNode};
pub use schema::*;
