//! Candidate correspondence discovery between two descriptor sets.

use super::types::{Candidate, DescriptorSet};

/// Source of candidate point correspondences between two tiles.
pub trait CorrespondenceFinder: Send + Sync {
    /// Return weighted candidate correspondences between two descriptor
    /// sets. `ratio_threshold` controls the nearest/second-nearest
    /// ambiguity test; larger values are stricter.
    fn find(&self, a: &DescriptorSet, b: &DescriptorSet, ratio_threshold: f32) -> Vec<Candidate>;
}

/// Brute-force nearest-neighbor matcher with a second-best ratio test.
///
/// A correspondence is accepted when the second-best match is at least
/// `ratio_threshold` times farther (in descriptor distance) than the best,
/// so ambiguous features produce no candidate at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl CorrespondenceFinder for BruteForceMatcher {
    fn find(&self, a: &DescriptorSet, b: &DescriptorSet, ratio_threshold: f32) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        if b.len() < 2 {
            return candidates;
        }
        let ratio_sq = ratio_threshold * ratio_threshold;
        for da in &a.descriptors {
            let mut best = f32::MAX;
            let mut second = f32::MAX;
            let mut best_idx = 0usize;
            for (j, db) in b.descriptors.iter().enumerate() {
                let d = da.distance_squared(db);
                if d < best {
                    second = best;
                    best = d;
                    best_idx = j;
                } else if d < second {
                    second = d;
                }
            }
            if best * ratio_sq < second {
                candidates.push(Candidate::new(
                    da.position,
                    b.descriptors[best_idx].position,
                    1.0,
                ));
            }
        }
        candidates
    }
}
