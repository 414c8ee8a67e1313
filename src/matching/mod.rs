//! Correspondence discovery and pairwise model fitting.
//!
//! # Contents
//!
//! - [`types`]: descriptors and candidate correspondences
//! - [`finder`]: nearest-neighbor candidate discovery
//! - [`ransac`]: consensus model estimation with epsilon escalation

pub mod finder;
pub mod ransac;
pub mod types;

pub use finder::{BruteForceMatcher, CorrespondenceFinder};
pub use ransac::{FitOutcome, ModelFitter};
pub use types::{Candidate, Descriptor, DescriptorSet};
