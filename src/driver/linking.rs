//! Coarse cross-section linking.
//!
//! Consecutive sections are first registered as whole images at reduced
//! resolution. The resulting affine corrects every tile of the newer
//! section at once, and the coarse inliers become bridging correspondences
//! between the two sections' tile graphs.

use crate::config::CoarseConfig;
use crate::core::{Point2D, Rect, Transform2D};
use crate::graph::{TileGraph, TileId};
use crate::matching::Candidate;

use super::Section;

/// Tolerances for a single coarse registration attempt.
#[derive(Debug, Clone, Copy)]
pub struct CoarseParams {
    /// Maximum allowed alignment error in full-resolution pixels.
    pub max_error: f64,
    /// Longest edge of the downsampled section image, in pixels.
    pub max_image_size: u32,
}

/// Result of coarsely registering one section onto its predecessor.
#[derive(Debug, Clone)]
pub struct CoarseRegistration {
    /// Maps the newer section's current placement onto the older one.
    pub affine: Transform2D,
    /// World bounding box the older section was rendered from.
    pub bbox_prev: Rect,
    /// World bounding box the newer section was rendered from.
    pub bbox_cur: Rect,
    /// Inlier correspondences in full-resolution pixels relative to each
    /// section's bounding-box origin: (older, newer) pairs, with the newer
    /// side expressed before the affine correction.
    pub inliers: Vec<(Point2D, Point2D)>,
}

/// Registers a whole section image onto the previous section's image.
///
/// Implementations render each section at reduced resolution, extract
/// features and fit a model between the two renderings. Returning `None`
/// means no acceptable model was found at the given tolerances; the driver
/// will retry with relaxed parameters.
pub trait CoarseSectionRegistrar: Send + Sync {
    /// Attempt one coarse registration of `cur` onto `prev`.
    fn register(
        &self,
        prev: &Section,
        cur: &Section,
        params: &CoarseParams,
    ) -> Option<CoarseRegistration>;
}

/// Run coarse registration, relaxing tolerances and doubling resolution on
/// each failure until the size ceiling is reached.
pub fn coarse_register_with_retry(
    registrar: &dyn CoarseSectionRegistrar,
    prev: &Section,
    cur: &Section,
    config: &CoarseConfig,
) -> Option<CoarseRegistration> {
    let mut params = CoarseParams {
        max_error: config.max_error,
        max_image_size: config.max_image_size,
    };
    loop {
        if let Some(registration) = registrar.register(prev, cur, &params) {
            log::info!(
                "coarse registration succeeded with {} inliers at size {}",
                registration.inliers.len(),
                params.max_image_size
            );
            return Some(registration);
        }
        if params.max_image_size >= config.image_size_ceiling {
            log::warn!(
                "coarse registration failed at size ceiling {}",
                config.image_size_ceiling
            );
            return None;
        }
        params.max_error *= config.error_relax_factor;
        params.max_image_size = (params.max_image_size * 2).min(config.image_size_ceiling);
        log::info!(
            "coarse registration failed; retrying at max_error {:.1} size {}",
            params.max_error,
            params.max_image_size
        );
    }
}

/// The tile in `scope` whose transformed center is closest to `point`.
pub fn nearest_tile(graph: &TileGraph, scope: &[TileId], point: &Point2D) -> Option<TileId> {
    scope
        .iter()
        .copied()
        .min_by(|&a, &b| {
            let da = graph.tile(a).center_world().distance_squared(point);
            let db = graph.tile(b).center_world().distance_squared(point);
            da.total_cmp(&db)
        })
}

/// Turn coarse inliers into bridging correspondences between the two
/// sections' tile graphs. Each inlier is routed to the nearest tile on
/// either side and expressed in those tiles' local frames. Returns the
/// number of bridges added.
///
/// Must be called after the coarse affine has been applied to the newer
/// section's tiles, so that both sides are in the shared world frame.
pub fn bridge_sections(
    graph: &mut TileGraph,
    prev_scope: &[TileId],
    cur_scope: &[TileId],
    registration: &CoarseRegistration,
) -> usize {
    let mut added = 0;
    for (pp, pc) in &registration.inliers {
        let world_prev = Point2D::new(
            registration.bbox_prev.min_x + pp.x,
            registration.bbox_prev.min_y + pp.y,
        );
        let world_cur = registration.affine.apply(&Point2D::new(
            registration.bbox_cur.min_x + pc.x,
            registration.bbox_cur.min_y + pc.y,
        ));

        let (tp, tc) = match (
            nearest_tile(graph, prev_scope, &world_prev),
            nearest_tile(graph, cur_scope, &world_cur),
        ) {
            (Some(tp), Some(tc)) => (tp, tc),
            _ => continue,
        };
        let (inv_p, inv_c) = match (
            graph.transform(tp).inverse(),
            graph.transform(tc).inverse(),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                log::warn!("non-invertible tile transform, bridge skipped");
                continue;
            }
        };
        graph.add_matches(
            tp,
            tc,
            &[Candidate::new(
                inv_p.apply(&world_prev),
                inv_c.apply(&world_cur),
                1.0,
            )],
        );
        added += 1;
    }
    log::debug!("{} bridging correspondences added", added);
    added
}
