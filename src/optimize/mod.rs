//! Iterative relaxation solver for tile configurations.
//!
//! # Algorithm
//!
//! Each iteration sweeps over the non-anchor tiles in stable index order
//! and refits every tile's transform against the *current* transforms of
//! its neighbors (Gauss-Seidel: later tiles in the sweep already see the
//! earlier updates). After a full sweep the mean per-tile residual (the
//! "overall displacement") is recorded.
//!
//! # Convergence
//!
//! A trailing window of iteration-to-iteration displacement deltas is kept.
//! Once the window is full, a least-squares line is fitted to it and the
//! run stops as converged only when both hold:
//!
//! 1. the overall displacement is at or below the acceptable error, and
//! 2. the fitted slope of the *delta* trend is non-negative, i.e. progress
//!    has stalled.
//!
//! A hard iteration cap guarantees termination; reaching it is a soft
//! failure and the best transforms found so far are kept.
//!
//! The sweep is strictly sequential and single-threaded; every tile update
//! must observe the latest state of tiles updated earlier in the same
//! sweep.

pub mod trend;

use std::collections::{HashSet, VecDeque};

use crate::config::OptimizerConfig;
use crate::core::ModelKind;
use crate::graph::{TileGraph, TileId};
use crate::observer::AlignObserver;

use trend::fit_line;

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Displacement below the acceptable error with a stalled trend.
    Converged,

    /// Hard iteration cap reached before the trend test passed. The best
    /// transforms found are kept; callers log and proceed.
    MaxIterationsReached,

    /// Nothing to optimize: no tile in scope carries a correspondence.
    NoMatches,
}

/// Result of one optimization run.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    /// Iterations performed.
    pub iterations: u64,

    /// Mean per-tile residual after the last sweep.
    pub mean_displacement: f64,

    /// Smallest per-tile residual.
    pub min_displacement: f64,

    /// Largest per-tile residual.
    pub max_displacement: f64,

    /// Why the run stopped.
    pub termination: TerminationReason,
}

impl OptimizeResult {
    /// Whether the run ended in an acceptable state.
    pub fn converged(&self) -> bool {
        matches!(
            self.termination,
            TerminationReason::Converged | TerminationReason::NoMatches
        )
    }
}

/// The iterative relaxation solver.
#[derive(Debug, Clone)]
pub struct GlobalOptimizer {
    config: OptimizerConfig,
}

impl GlobalOptimizer {
    /// Create an optimizer with the given iteration bounds.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize the overall displacement of the tiles in `scope`, holding
    /// every tile in `anchors` fixed.
    ///
    /// `max_acceptable_error` is the per-run maximal alignment error; the
    /// run only converges once the mean residual is at or below it.
    pub fn optimize(
        &self,
        graph: &mut TileGraph,
        scope: &[TileId],
        anchors: &[TileId],
        kind: ModelKind,
        max_acceptable_error: f64,
        observer: &dyn AlignObserver,
    ) -> OptimizeResult {
        let anchor_set: HashSet<TileId> = anchors.iter().copied().collect();
        let free: Vec<TileId> = scope
            .iter()
            .copied()
            .filter(|id| !anchor_set.contains(id))
            .collect();

        let total_matches: usize = scope.iter().map(|&id| graph.tile(id).num_matches()).sum();
        if scope.is_empty() || total_matches == 0 {
            return OptimizeResult {
                iterations: 0,
                mean_displacement: 0.0,
                min_displacement: 0.0,
                max_displacement: 0.0,
                termination: TerminationReason::NoMatches,
            };
        }

        graph.update_all(scope);

        let window = self.config.trend_window.max(1);
        let mut deltas: VecDeque<f64> = VecDeque::with_capacity(window);
        let mut od = f64::MAX;
        let mut min_d = 0.0;
        let mut max_d = 0.0;
        let mut iterations = 0u64;
        let mut termination = TerminationReason::MaxIterationsReached;

        while iterations < self.config.max_iterations {
            iterations += 1;

            for &id in &free {
                graph.update_tile(id);
                graph.refit_tile(id, kind);
                graph.update_tile(id);
            }

            let mut mean = 0.0;
            min_d = f64::MAX;
            max_d = f64::MIN;
            for &id in scope {
                graph.update_tile(id);
                let d = graph.tile(id).distance();
                if d < min_d {
                    min_d = d;
                }
                if d > max_d {
                    max_d = d;
                }
                mean += d;
            }
            mean /= scope.len() as f64;

            if od != f64::MAX {
                if deltas.len() == window {
                    deltas.pop_front();
                }
                deltas.push_back((od - mean).abs());
            }
            od = mean;

            if iterations % 100 == 0 {
                observer.status(&format!(
                    "displacement: {:.3} after {} iterations",
                    od, iterations
                ));
            }

            if deltas.len() >= window {
                let deltas_vec: Vec<f64> = deltas.iter().copied().collect();
                let fit = fit_line(&deltas_vec);
                if od <= max_acceptable_error && fit.slope >= 0.0 {
                    log::info!(
                        "exiting at iteration {} with delta slope {:.3e}",
                        iterations,
                        fit.slope
                    );
                    termination = TerminationReason::Converged;
                    break;
                }
            }
        }

        if termination == TerminationReason::MaxIterationsReached {
            log::warn!(
                "iteration cap {} reached at displacement {:.3}; keeping best transforms",
                self.config.max_iterations,
                od
            );
        }

        log::info!(
            "optimized configuration of {} tiles: mean {:.3} px, min {:.3} px, max {:.3} px",
            scope.len(),
            od,
            min_d,
            max_d
        );

        OptimizeResult {
            iterations,
            mean_displacement: od,
            min_displacement: min_d,
            max_displacement: max_d,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Point2D, Transform2D};
    use crate::matching::Candidate;
    use crate::observer::NoopObserver;

    fn two_tile_graph(offset: (f64, f64)) -> TileGraph {
        // tile 0 at origin, tile 1 displaced from its true position by
        // `offset`; four exact matches define the truth
        let mut graph = TileGraph::new();
        graph.add_tile(0, 100.0, 100.0, Transform2D::identity());
        graph.add_tile(
            1,
            100.0,
            100.0,
            Transform2D::translation(50.0 - offset.0, -offset.1),
        );

        let truth = Transform2D::translation(50.0, 0.0);
        let candidates: Vec<Candidate> = [(60.0, 10.0), (90.0, 20.0), (70.0, 80.0), (95.0, 95.0)]
            .iter()
            .map(|&(x, y)| {
                let world = Point2D::new(x, y);
                Candidate::new(world, truth.inverse().unwrap().apply(&world), 1.0)
            })
            .collect();
        graph.add_matches(0, 1, &candidates);
        graph
    }

    fn config(window: usize) -> OptimizerConfig {
        OptimizerConfig {
            max_iterations: 10_000,
            trend_window: window,
        }
    }

    #[test]
    fn test_empty_scope_is_no_matches() {
        let mut graph = TileGraph::new();
        let optimizer = GlobalOptimizer::new(config(10));
        let result = optimizer.optimize(&mut graph, &[], &[], ModelKind::Rigid, 1.0, &NoopObserver);
        assert_eq!(result.termination, TerminationReason::NoMatches);
        assert!(result.converged());
    }

    #[test]
    fn test_matchless_tiles_are_no_matches() {
        let mut graph = TileGraph::new();
        graph.add_tile(0, 10.0, 10.0, Transform2D::identity());
        let optimizer = GlobalOptimizer::new(config(10));
        let result =
            optimizer.optimize(&mut graph, &[0], &[0], ModelKind::Rigid, 1.0, &NoopObserver);
        assert_eq!(result.termination, TerminationReason::NoMatches);
    }

    #[test]
    fn test_two_tiles_converge() {
        let mut graph = two_tile_graph((10.0, 5.0));
        let optimizer = GlobalOptimizer::new(config(10));
        let result = optimizer.optimize(
            &mut graph,
            &[0, 1],
            &[0],
            ModelKind::Translation,
            0.5,
            &NoopObserver,
        );
        assert_eq!(result.termination, TerminationReason::Converged);
        assert!(result.mean_displacement <= 0.5);
    }

    #[test]
    fn test_anchor_bit_identical() {
        let mut graph = two_tile_graph((10.0, 5.0));
        let before = graph.transform(0);
        let optimizer = GlobalOptimizer::new(config(10));
        optimizer.optimize(
            &mut graph,
            &[0, 1],
            &[0],
            ModelKind::Translation,
            0.5,
            &NoopObserver,
        );
        let after = graph.transform(0);
        assert_eq!(before.m00.to_bits(), after.m00.to_bits());
        assert_eq!(before.m01.to_bits(), after.m01.to_bits());
        assert_eq!(before.m02.to_bits(), after.m02.to_bits());
        assert_eq!(before.m10.to_bits(), after.m10.to_bits());
        assert_eq!(before.m11.to_bits(), after.m11.to_bits());
        assert_eq!(before.m12.to_bits(), after.m12.to_bits());
    }

    #[test]
    fn test_iteration_cap_is_soft() {
        let mut graph = two_tile_graph((10.0, 5.0));
        let optimizer = GlobalOptimizer::new(OptimizerConfig {
            max_iterations: 3,
            trend_window: 100,
        });
        let result = optimizer.optimize(
            &mut graph,
            &[0, 1],
            &[0],
            ModelKind::Translation,
            0.5,
            &NoopObserver,
        );
        assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
        assert_eq!(result.iterations, 3);
        assert!(!result.converged());
    }

    #[test]
    fn test_threshold_alone_does_not_converge() {
        // displacement may dip below the threshold while the delta trend
        // is still steeply negative; the run must not stop before the
        // trend window is even full
        let mut graph = two_tile_graph((0.2, 0.1));
        let optimizer = GlobalOptimizer::new(OptimizerConfig {
            max_iterations: 50,
            trend_window: 100,
        });
        let result = optimizer.optimize(
            &mut graph,
            &[0, 1],
            &[0],
            ModelKind::Translation,
            1000.0,
            &NoopObserver,
        );
        // window never fills within 50 iterations
        assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    }
}
