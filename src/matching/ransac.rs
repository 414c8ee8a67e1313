//! RANSAC model estimation from candidate correspondences.
//!
//! Two nested loops:
//!
//! 1. An inner RANSAC: sample a minimal candidate set, fit the model
//!    exactly, count inliers within epsilon, keep the consensus winner and
//!    refit it on all inliers (weighted).
//! 2. An outer epsilon escalation: starting from the tight tolerance, the
//!    allowed error grows in `min_epsilon` steps until `max_epsilon`. The
//!    escalation stops early once four consecutive steps fail to improve
//!    the inlier count, which signals that loosening the tolerance only
//!    admits noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PairTolerance;
use crate::core::{ModelKind, Point2D, Transform2D};

use super::types::Candidate;

/// Escalation steps without inlier improvement before giving up.
const CONVERGENCE_STEPS: u32 = 4;

/// A successful pairwise model fit.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Best-fit transform mapping first-tile local points onto
    /// second-tile local points.
    pub transform: Transform2D,
    /// The candidates consistent with the transform.
    pub inliers: Vec<Candidate>,
}

/// RANSAC-based model fitter.
#[derive(Debug, Clone)]
pub struct ModelFitter {
    /// RANSAC iterations per epsilon step.
    pub iterations: u32,
    /// RNG seed; fixed so runs are reproducible.
    pub seed: u64,
}

impl Default for ModelFitter {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: 69997,
        }
    }
}

impl ModelFitter {
    /// Estimate the best transform explaining the candidates, or `None`
    /// when no consensus model exists.
    ///
    /// Never panics: fewer candidates than the minimal set size simply
    /// yields `None`.
    pub fn fit_model(
        &self,
        kind: ModelKind,
        candidates: &[Candidate],
        tolerance: &PairTolerance,
    ) -> Option<FitOutcome> {
        if candidates.len() <= kind.minimal_set_size() {
            return None;
        }
        // a non-positive step would keep the escalation at epsilon <= 0 forever
        if tolerance.min_epsilon <= 0.0 {
            log::warn!(
                "non-positive min_epsilon {}; no model fit attempted",
                tolerance.min_epsilon
            );
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut outcome: Option<FitOutcome> = None;
        let mut highest_num_inliers = 0usize;
        let mut convergence_count = 0u32;
        let mut epsilon = 0.0f64;

        loop {
            epsilon += tolerance.min_epsilon;
            if let Some(found) = self.ransac(kind, candidates, epsilon, tolerance, &mut rng) {
                let num_inliers = found.inliers.len();
                if num_inliers <= highest_num_inliers {
                    convergence_count += 1;
                } else {
                    convergence_count = 0;
                    highest_num_inliers = num_inliers;
                }
                outcome = Some(found);
            }
            let done = outcome.is_some() && convergence_count >= CONVERGENCE_STEPS;
            if done || epsilon >= tolerance.max_epsilon {
                break;
            }
        }

        outcome
    }

    /// One RANSAC pass at a fixed epsilon.
    fn ransac(
        &self,
        kind: ModelKind,
        candidates: &[Candidate],
        epsilon: f64,
        tolerance: &PairTolerance,
        rng: &mut StdRng,
    ) -> Option<FitOutcome> {
        let k = kind.minimal_set_size();
        let n = candidates.len();

        let mut best_inliers: Vec<usize> = Vec::new();
        let mut sample = vec![0usize; k];
        let mut minimal = vec![(Point2D::default(), Point2D::default(), 1.0f64); k];

        for _ in 0..self.iterations {
            sample_distinct(rng, n, &mut sample);
            for (slot, &idx) in minimal.iter_mut().zip(&sample) {
                let c = &candidates[idx];
                *slot = (c.p, c.q, 1.0);
            }
            let Some(model) = Transform2D::fit(kind, &minimal) else {
                continue;
            };

            let inliers: Vec<usize> = (0..n)
                .filter(|&i| {
                    let c = &candidates[i];
                    model.apply(&c.p).distance(&c.q) < epsilon
                })
                .collect();
            if inliers.len() > best_inliers.len() {
                best_inliers = inliers;
            }
        }

        let ratio = best_inliers.len() as f64 / n as f64;
        if best_inliers.len() <= k || ratio < tolerance.min_inlier_ratio {
            return None;
        }

        // Weighted refit on the consensus set.
        let inliers: Vec<Candidate> = best_inliers.iter().map(|&i| candidates[i]).collect();
        let pairs: Vec<(Point2D, Point2D, f64)> =
            inliers.iter().map(|c| (c.p, c.q, c.weight)).collect();
        let transform = Transform2D::fit(kind, &pairs)?;
        Some(FitOutcome { transform, inliers })
    }
}

/// Fill `out` with distinct indices in `0..n`.
fn sample_distinct(rng: &mut StdRng, n: usize, out: &mut [usize]) {
    for i in 0..out.len() {
        loop {
            let idx = rng.gen_range(0..n);
            if !out[..i].contains(&idx) {
                out[i] = idx;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tolerance() -> PairTolerance {
        PairTolerance {
            min_epsilon: 1.0,
            max_epsilon: 10.0,
            min_inlier_ratio: 0.05,
        }
    }

    fn translated_candidates(dx: f64, dy: f64, n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                let p = Point2D::new((i % 13) as f64 * 17.0, (i / 13) as f64 * 23.0);
                Candidate::new(p, Point2D::new(p.x + dx, p.y + dy), 1.0)
            })
            .collect()
    }

    #[test]
    fn test_too_few_candidates_is_none() {
        let fitter = ModelFitter::default();
        assert!(fitter
            .fit_model(ModelKind::Translation, &[], &tolerance())
            .is_none());
        let one = translated_candidates(1.0, 1.0, 1);
        assert!(fitter
            .fit_model(ModelKind::Translation, &one, &tolerance())
            .is_none());
        let two = translated_candidates(1.0, 1.0, 2);
        assert!(fitter
            .fit_model(ModelKind::Rigid, &two, &tolerance())
            .is_none());
    }

    #[test]
    fn test_non_positive_epsilon_step_is_none() {
        // must return rather than escalate in zero-size steps
        let fitter = ModelFitter::default();
        let candidates = translated_candidates(1.0, 1.0, 30);
        let tol = PairTolerance {
            min_epsilon: 0.0,
            max_epsilon: 10.0,
            min_inlier_ratio: 0.05,
        };
        assert!(fitter
            .fit_model(ModelKind::Translation, &candidates, &tol)
            .is_none());
    }

    #[test]
    fn test_clean_translation_recovered() {
        let fitter = ModelFitter::default();
        let candidates = translated_candidates(12.5, -3.25, 30);
        let outcome = fitter
            .fit_model(ModelKind::Translation, &candidates, &tolerance())
            .unwrap();
        assert_relative_eq!(outcome.transform.m02, 12.5, epsilon = 1e-9);
        assert_relative_eq!(outcome.transform.m12, -3.25, epsilon = 1e-9);
        assert_eq!(outcome.inliers.len(), 30);
    }

    #[test]
    fn test_outliers_rejected() {
        let fitter = ModelFitter::default();
        let mut candidates = translated_candidates(10.0, 5.0, 24);
        // gross outliers
        for i in 0..8 {
            let p = Point2D::new(i as f64 * 31.0, i as f64 * 7.0);
            candidates.push(Candidate::new(
                p,
                Point2D::new(p.x + 500.0 + i as f64 * 90.0, p.y - 300.0),
                1.0,
            ));
        }
        let outcome = fitter
            .fit_model(ModelKind::Rigid, &candidates, &tolerance())
            .unwrap();
        assert_eq!(outcome.inliers.len(), 24);
        assert_relative_eq!(outcome.transform.m02, 10.0, epsilon = 1e-6);
        assert_relative_eq!(outcome.transform.m12, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pure_noise_is_none() {
        let fitter = ModelFitter::default();
        // scattered, mutually inconsistent pairs
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| {
                let i = i as f64;
                Candidate::new(
                    Point2D::new(i * 13.0, i * 29.0),
                    Point2D::new((i * 997.0) % 451.0, (i * 613.0) % 387.0),
                    1.0,
                )
            })
            .collect();
        let tol = PairTolerance {
            min_epsilon: 0.5,
            max_epsilon: 2.0,
            min_inlier_ratio: 0.5,
        };
        assert!(fitter
            .fit_model(ModelKind::Rigid, &candidates, &tol)
            .is_none());
    }

    #[test]
    fn test_reproducible_across_calls() {
        let fitter = ModelFitter::default();
        let candidates = translated_candidates(4.0, 4.0, 20);
        let a = fitter
            .fit_model(ModelKind::Rigid, &candidates, &tolerance())
            .unwrap();
        let b = fitter
            .fit_model(ModelKind::Rigid, &candidates, &tolerance())
            .unwrap();
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.inliers.len(), b.inliers.len());
    }
}
