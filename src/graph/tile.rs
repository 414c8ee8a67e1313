//! Tile: the per-image optimization unit.

use serde::{Deserialize, Serialize};

use crate::core::{Point2D, Rect, Transform2D};

/// Stable arena index of a tile within a [`TileGraph`](super::TileGraph).
pub type TileId = usize;

/// One point correspondence incident to a tile.
///
/// `p` is in this tile's local frame, `q` in the other tile's local frame.
/// World coordinates are derived from the owning tiles' current transforms
/// whenever residuals are computed, so they are never stale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TileMatch {
    /// Point in this tile's local frame.
    pub p: Point2D,
    /// Corresponding point in the other tile's local frame.
    pub q: Point2D,
    /// Arena index of the other tile.
    pub other: TileId,
    /// Confidence weight in (0, 1]; synthetic matches may be down-weighted.
    pub weight: f64,
}

/// A node in the tile graph wrapping one image tile's transform, its
/// incident correspondences and derived error statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    /// Identifier of the persisted patch record this tile was built from.
    pub patch_id: u64,

    /// Tile image width in local pixels.
    pub width: f64,

    /// Tile image height in local pixels.
    pub height: f64,

    /// Current local-to-world transform.
    pub transform: Transform2D,

    /// Incident correspondences, in this tile's orientation.
    pub(crate) matches: Vec<TileMatch>,

    /// Directly connected tiles (deduplicated).
    pub(crate) connected: Vec<TileId>,

    /// Cached weighted mean residual; valid only after
    /// [`TileGraph::update_tile`](super::TileGraph::update_tile).
    pub(crate) distance: f64,

    /// Cached weighted mean squared residual.
    pub(crate) error: f64,
}

impl Tile {
    /// Create a tile with no correspondences.
    pub fn new(patch_id: u64, width: f64, height: f64, transform: Transform2D) -> Self {
        Self {
            patch_id,
            width,
            height,
            transform,
            matches: Vec::new(),
            connected: Vec::new(),
            distance: 0.0,
            error: 0.0,
        }
    }

    /// Number of incident correspondences.
    pub fn num_matches(&self) -> usize {
        self.matches.len()
    }

    /// Incident correspondences.
    pub fn matches(&self) -> &[TileMatch] {
        &self.matches
    }

    /// Directly connected tiles.
    pub fn connected(&self) -> &[TileId] {
        &self.connected
    }

    /// Weighted mean residual as of the last update.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Weighted mean squared residual as of the last update.
    pub fn error(&self) -> f64 {
        self.error
    }

    /// World-space bounding box of the transformed image rectangle.
    pub fn bbox(&self) -> Rect {
        let corners = [
            Point2D::new(0.0, 0.0),
            Point2D::new(self.width, 0.0),
            Point2D::new(self.width, self.height),
            Point2D::new(0.0, self.height),
        ];
        let world: Vec<Point2D> = corners.iter().map(|c| self.transform.apply(c)).collect();
        // four corners, never empty
        Rect::bounding(&world).unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Transformed center of the image rectangle.
    pub fn center_world(&self) -> Point2D {
        self.transform
            .apply(&Point2D::new(self.width * 0.5, self.height * 0.5))
    }

    pub(crate) fn add_connection(&mut self, other: TileId) {
        if !self.connected.contains(&other) {
            self.connected.push(other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_translated() {
        let t = Tile::new(1, 100.0, 50.0, Transform2D::translation(10.0, 20.0));
        let b = t.bbox();
        assert_eq!(b.min_x, 10.0);
        assert_eq!(b.min_y, 20.0);
        assert_eq!(b.max_x, 110.0);
        assert_eq!(b.max_y, 70.0);
    }

    #[test]
    fn test_bbox_rotated_grows() {
        let t = Tile::new(
            1,
            100.0,
            100.0,
            Transform2D::rigid(std::f64::consts::FRAC_PI_4, 0.0, 0.0),
        );
        let b = t.bbox();
        // a 45° rotated square needs a wider box
        assert!(b.width() > 100.0);
        assert!(b.height() > 100.0);
    }

    #[test]
    fn test_center_world() {
        let t = Tile::new(1, 100.0, 50.0, Transform2D::translation(10.0, 0.0));
        let c = t.center_world();
        assert_eq!(c.x, 60.0);
        assert_eq!(c.y, 25.0);
    }

    #[test]
    fn test_connection_dedup() {
        let mut t = Tile::new(1, 10.0, 10.0, Transform2D::identity());
        t.add_connection(3);
        t.add_connection(3);
        t.add_connection(5);
        assert_eq!(t.connected(), &[3, 5]);
    }
}
