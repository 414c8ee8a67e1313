//! Geometric foundation layer.
//!
//! Bottom layer of the crate with no internal dependencies.
//!
//! # Contents
//!
//! - [`geom`]: points and bounding rectangles
//! - [`transform`]: 2D transforms and weighted least-squares fits

pub mod geom;
pub mod transform;

pub use geom::{Point2D, Rect};
pub use transform::{ModelKind, Transform2D};
