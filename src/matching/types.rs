//! Types shared across the matching layer.

use serde::{Deserialize, Serialize};

use crate::core::Point2D;

/// A local feature descriptor: a position in the tile's local frame plus a
/// feature vector. The descriptor algorithm itself lives behind
/// [`DescriptorExtractor`](crate::driver::DescriptorExtractor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Position in local (tile-intrinsic) pixels.
    pub position: Point2D,
    /// Feature vector; compared by squared Euclidean distance.
    pub vector: Vec<f32>,
}

impl Descriptor {
    /// Create a descriptor.
    pub fn new(position: Point2D, vector: Vec<f32>) -> Self {
        Self { position, vector }
    }

    /// Squared Euclidean distance between feature vectors.
    pub fn distance_squared(&self, other: &Descriptor) -> f32 {
        self.vector
            .iter()
            .zip(&other.vector)
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }
}

/// All descriptors extracted from one tile image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorSet {
    /// Descriptors in local coordinates.
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    /// Create from a descriptor list.
    pub fn new(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A candidate point correspondence between two tiles, in each tile's local
/// frame, with a confidence weight in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Point in the first tile's local frame.
    pub p: Point2D,
    /// Point in the second tile's local frame.
    pub q: Point2D,
    /// Confidence weight in (0, 1].
    pub weight: f64,
}

impl Candidate {
    /// Create a candidate correspondence.
    pub fn new(p: Point2D, q: Point2D, weight: f64) -> Self {
        Self { p, q, weight }
    }
}
