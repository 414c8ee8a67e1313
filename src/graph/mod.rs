//! Tile connectivity graph.
//!
//! # Contents
//!
//! - [`tile`]: the per-image optimization unit
//! - [`tile_graph`]: arena, edges, components, repair and anchor selection

pub mod tile;
pub mod tile_graph;

pub use tile::{Tile, TileId, TileMatch};
pub use tile_graph::TileGraph;
