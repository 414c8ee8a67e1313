//! mosaic-align - Elastic-free 2D mosaic and serial-section registration
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    driver/                          │  ← Orchestration
//! │        (extraction pool, coarse linking)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │               graph/  +  optimize/                  │  ← Core algorithms
//! │      (tile graph, relaxation solver, trend)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   matching/                         │  ← Correspondences
//! │        (descriptor matching, robust fitting)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (geometry, transforms)               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! A run walks the section stack in order:
//!
//! 1. Extract feature descriptors for every patch of the section on a
//!    worker pool.
//! 2. Match overlapping tile pairs and fit a robust pairwise model per
//!    pair; accepted inliers become weighted point correspondences in the
//!    tile graph.
//! 3. Repair a disconnected graph from the tiles' current placements,
//!    pick one anchor per connected component and relax the section until
//!    the mean residual settles below the tolerance.
//! 4. Coarsely register the section onto its predecessor as whole images,
//!    apply the correcting affine to all of its tiles and bridge the two
//!    graphs with the coarse inliers plus direct cross-section matches.
//! 5. After the last section, relax the whole stack in one global pass.
//!
//! The caller supplies the image-dependent pieces behind traits:
//! [`DescriptorExtractor`] for per-patch features and
//! [`CoarseSectionRegistrar`] for whole-section registration. Everything
//! downstream of descriptors is pure geometry and runs the same for any
//! feature type.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Correspondence discovery and robust fitting
// ============================================================================
pub mod matching;

// ============================================================================
// Layer 3: Tile graph and relaxation solver
// ============================================================================
pub mod graph;
pub mod optimize;

// ============================================================================
// Layer 4: Pipeline orchestration
// ============================================================================
pub mod driver;

// ============================================================================
// Cross-cutting: configuration, errors, progress reporting
// ============================================================================
pub mod config;
pub mod error;
pub mod observer;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core geometry
pub use crate::core::{ModelKind, Point2D, Rect, Transform2D};

// Matching
pub use matching::{
    BruteForceMatcher, Candidate, CorrespondenceFinder, Descriptor, DescriptorSet, FitOutcome,
    ModelFitter,
};

// Graph
pub use graph::{Tile, TileGraph, TileId, TileMatch};

// Optimizer
pub use optimize::{GlobalOptimizer, OptimizeResult, TerminationReason};

// Driver
pub use driver::{
    CoarseParams, CoarseRegistration, CoarseSectionRegistrar, DescriptorExtractor,
    LayerRegistrationDriver, Patch, RegistrationReport, Section, SectionOutcome,
};

// Configuration and errors
pub use config::{AlignConfig, CoarseConfig, OptimizerConfig, PairTolerance};
pub use error::{AlignError, Result};
pub use observer::{AlignObserver, NoopObserver};
