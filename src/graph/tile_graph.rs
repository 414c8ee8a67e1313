//! Dynamic tile-connectivity graph.
//!
//! Tiles live in an arena addressed by stable [`TileId`] indices; edges are
//! adjacency lists of indices. An edge exists between two tiles exactly
//! when a pairwise model fit succeeded (or a synthetic repair connection
//! was made), and carries its inlier correspondences attached to both tiles
//! in their respective local frames.

use std::collections::HashSet;

use crate::config::PairTolerance;
use crate::core::{ModelKind, Point2D, Transform2D};
use crate::matching::{Candidate, CorrespondenceFinder, DescriptorSet, ModelFitter};

use super::tile::{Tile, TileId, TileMatch};

/// Weight for synthetic repair matches between two multi-tile components.
const REPAIR_WEIGHT: f64 = 1.0;
/// Weight for synthetic repair matches involving a previously isolated tile.
const REPAIR_WEIGHT_SINGLETON: f64 = 0.1;

/// The undirected connectivity graph over tiles.
#[derive(Debug, Default)]
pub struct TileGraph {
    tiles: Vec<Tile>,
}

impl TileGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tile, returning its stable arena index.
    pub fn add_tile(&mut self, patch_id: u64, width: f64, height: f64, transform: Transform2D) -> TileId {
        self.tiles.push(Tile::new(patch_id, width, height, transform));
        self.tiles.len() - 1
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the graph holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Get a tile by index.
    pub fn tile(&self, id: TileId) -> &Tile {
        &self.tiles[id]
    }

    /// All tiles in arena order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Current transform of a tile.
    pub fn transform(&self, id: TileId) -> Transform2D {
        self.tiles[id].transform
    }

    /// Replace a tile's transform and immediately recompute its residuals.
    pub fn set_transform(&mut self, id: TileId, transform: Transform2D) {
        self.tiles[id].transform = transform;
        self.update_tile(id);
    }

    /// Pre-concatenate `outer` onto a tile's transform (applied after the
    /// tile's own transform) and recompute its residuals.
    pub fn pre_concat_transform(&mut self, id: TileId, outer: &Transform2D) {
        self.tiles[id].transform.pre_concat(outer);
        self.update_tile(id);
    }

    /// Attach accepted inlier correspondences between two tiles and record
    /// the edge. `candidates` are in (a-local, b-local) orientation.
    pub fn add_matches(&mut self, a: TileId, b: TileId, candidates: &[Candidate]) {
        for c in candidates {
            self.tiles[a].matches.push(TileMatch {
                p: c.p,
                q: c.q,
                other: b,
                weight: c.weight,
            });
            self.tiles[b].matches.push(TileMatch {
                p: c.q,
                q: c.p,
                other: a,
                weight: c.weight,
            });
        }
        if !candidates.is_empty() {
            self.tiles[a].add_connection(b);
            self.tiles[b].add_connection(a);
        }
    }

    /// All unordered tile pairs within `scope`.
    pub fn all_pairs(&self, scope: &[TileId]) -> Vec<(TileId, TileId)> {
        let mut pairs = Vec::new();
        for i in 0..scope.len() {
            for j in (i + 1)..scope.len() {
                pairs.push((scope[i], scope[j]));
            }
        }
        pairs
    }

    /// Unordered tile pairs within `scope` whose world bounding boxes
    /// overlap. Only meaningful when placements are roughly correct.
    pub fn overlapping_pairs(&self, scope: &[TileId]) -> Vec<(TileId, TileId)> {
        let boxes: Vec<_> = scope.iter().map(|&id| self.tiles[id].bbox()).collect();
        let mut pairs = Vec::new();
        for i in 0..scope.len() {
            for j in (i + 1)..scope.len() {
                if boxes[i].intersects(&boxes[j]) {
                    pairs.push((scope[i], scope[j]));
                }
            }
        }
        pairs
    }

    /// Cross-scope tile pairs, optionally restricted to overlapping boxes.
    pub fn cross_pairs(
        &self,
        a_scope: &[TileId],
        b_scope: &[TileId],
        require_overlap: bool,
    ) -> Vec<(TileId, TileId)> {
        let mut pairs = Vec::new();
        for &a in a_scope {
            let box_a = self.tiles[a].bbox();
            for &b in b_scope {
                if !require_overlap || box_a.intersects(&self.tiles[b].bbox()) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    /// Run correspondence discovery and model fitting over the given tile
    /// pairs, connecting every pair for which a model is found.
    ///
    /// `descriptors` is indexed by [`TileId`]. Returns the number of edges
    /// added.
    #[allow(clippy::too_many_arguments)]
    pub fn build_edges(
        &mut self,
        pairs: &[(TileId, TileId)],
        descriptors: &[DescriptorSet],
        finder: &dyn CorrespondenceFinder,
        fitter: &ModelFitter,
        kind: ModelKind,
        ratio_threshold: f32,
        tolerance: &PairTolerance,
    ) -> usize {
        let mut edges = 0;
        for &(a, b) in pairs {
            let candidates = finder.find(&descriptors[a], &descriptors[b], ratio_threshold);
            log::debug!(
                "tiles {} and {}: {} candidate correspondences",
                a,
                b,
                candidates.len()
            );
            match fitter.fit_model(kind, &candidates, tolerance) {
                Some(outcome) => {
                    log::debug!("tiles {} and {}: {} inliers", a, b, outcome.inliers.len());
                    self.add_matches(a, b, &outcome.inliers);
                    edges += 1;
                }
                None => {
                    log::debug!("tiles {} and {}: no model found", a, b);
                }
            }
        }
        edges
    }

    /// Partition `scope` into maximal connected subsets.
    ///
    /// Deterministic given identical edges: components are discovered in
    /// tile-index order and each component lists its tiles in visit order.
    pub fn connected_components(&self, scope: &[TileId]) -> Vec<Vec<TileId>> {
        let in_scope: HashSet<TileId> = scope.iter().copied().collect();
        let mut visited: HashSet<TileId> = HashSet::new();
        let mut components = Vec::new();

        for &start in scope {
            if visited.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            visited.insert(start);
            while let Some(id) = stack.pop() {
                component.push(id);
                for &next in &self.tiles[id].connected {
                    if in_scope.contains(&next) && visited.insert(next) {
                        stack.push(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Synthesize low-confidence correspondences between disconnected
    /// components whose tiles spatially overlap, then recompute the
    /// partition.
    ///
    /// Valid only when the tiles are known to be roughly pre-aligned. The
    /// corners of each overlap rectangle are mapped into both tiles' local
    /// frames through their inverse transforms, pinning the current
    /// relative placement. Matches involving a previously isolated tile
    /// get a much lower weight. More than one component may remain when no
    /// geometric overlap exists; the caller decides what that means.
    pub fn repair_disconnected(
        &mut self,
        components: &[Vec<TileId>],
        scope: &[TileId],
    ) -> Vec<Vec<TileId>> {
        if components.len() <= 1 {
            return components.to_vec();
        }

        let mut added = 0usize;
        for (ci, comp_a) in components.iter().enumerate() {
            for comp_b in components.iter().skip(ci + 1) {
                for &a in comp_a {
                    for &b in comp_b {
                        added += self.synthesize_overlap_matches(
                            a,
                            b,
                            comp_a.len() == 1 || comp_b.len() == 1,
                        );
                    }
                }
            }
        }
        log::info!(
            "graph repair: {} synthetic matches across {} components",
            added,
            components.len()
        );
        self.connected_components(scope)
    }

    fn synthesize_overlap_matches(&mut self, a: TileId, b: TileId, singleton: bool) -> usize {
        let overlap = match self.tiles[a].bbox().intersection(&self.tiles[b].bbox()) {
            Some(r) => r,
            None => return 0,
        };
        let inv_a = match self.tiles[a].transform.inverse() {
            Some(t) => t,
            None => {
                log::warn!("tile {}: non-invertible transform, repair skipped", a);
                return 0;
            }
        };
        let inv_b = match self.tiles[b].transform.inverse() {
            Some(t) => t,
            None => {
                log::warn!("tile {}: non-invertible transform, repair skipped", b);
                return 0;
            }
        };

        let weight = if singleton {
            REPAIR_WEIGHT_SINGLETON
        } else {
            REPAIR_WEIGHT
        };
        let matches: Vec<Candidate> = overlap
            .corners()
            .iter()
            .map(|corner| Candidate::new(inv_a.apply(corner), inv_b.apply(corner), weight))
            .collect();
        let n = matches.len();
        self.add_matches(a, b, &matches);
        n
    }

    /// Pick one anchor tile per component: the tile with the most incident
    /// correspondences (first wins on ties). The anchor's transform is held
    /// fixed during optimization; without it the component is
    /// under-determined.
    pub fn select_anchors(&self, components: &[Vec<TileId>]) -> Vec<TileId> {
        components
            .iter()
            .filter(|c| !c.is_empty())
            .map(|component| {
                let mut best = component[0];
                let mut best_count = self.tiles[best].num_matches();
                for &id in &component[1..] {
                    let count = self.tiles[id].num_matches();
                    if count > best_count {
                        best = id;
                        best_count = count;
                    }
                }
                best
            })
            .collect()
    }

    /// Weighted mean and mean-squared residual of a tile against its
    /// neighbors' current transforms.
    pub fn tile_residuals(&self, id: TileId) -> (f64, f64) {
        let tile = &self.tiles[id];
        if tile.matches.is_empty() {
            return (0.0, 0.0);
        }
        let mut dist = 0.0;
        let mut err = 0.0;
        let mut weight_sum = 0.0;
        for m in &tile.matches {
            let own = tile.transform.apply(&m.p);
            let other = self.tiles[m.other].transform.apply(&m.q);
            let d = own.distance(&other);
            dist += m.weight * d;
            err += m.weight * d * d;
            weight_sum += m.weight;
        }
        (dist / weight_sum, err / weight_sum)
    }

    /// Recompute and cache a tile's residual statistics. Must be called
    /// after any transform mutation before the statistics are read.
    pub fn update_tile(&mut self, id: TileId) {
        let (distance, error) = self.tile_residuals(id);
        let tile = &mut self.tiles[id];
        tile.distance = distance;
        tile.error = error;
    }

    /// Recompute residuals for every tile in `scope`.
    pub fn update_all(&mut self, scope: &[TileId]) {
        for &id in scope {
            self.update_tile(id);
        }
    }

    /// One Gauss-Seidel step: refit this tile's transform against the
    /// current world positions of its correspondences in neighboring
    /// tiles. Neighbors are left untouched. Keeps the old transform when
    /// the configuration is degenerate.
    pub fn refit_tile(&mut self, id: TileId, kind: ModelKind) {
        let targets: Vec<(Point2D, Point2D, f64)> = self.tiles[id]
            .matches
            .iter()
            .map(|m| (m.p, self.tiles[m.other].transform.apply(&m.q), m.weight))
            .collect();
        if let Some(transform) = Transform2D::fit(kind, &targets) {
            self.tiles[id].transform = transform;
        }
    }
}
