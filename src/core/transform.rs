//! 2D transforms and weighted least-squares model fits.
//!
//! A single 2x3 affine matrix represents every model class; [`ModelKind`]
//! selects which fit is used to estimate it. The closed forms minimize the
//! weighted sum of squared distances between transformed source points and
//! fixed target points:
//!
//! ```text
//! argmin_T  Σ wᵢ |T(pᵢ) - qᵢ|²
//! ```
//!
//! - Translation: weighted mean displacement.
//! - Rigid: weighted center-of-mass alignment plus an atan2 angle estimate.
//! - Affine: 3x3 normal equations solved by dense Cholesky.

use serde::{Deserialize, Serialize};

use super::geom::Point2D;

/// Which transform class is estimated for every tile of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Translation only
    Translation,
    /// Translation and rotation
    #[default]
    Rigid,
    /// General affine
    Affine,
}

impl ModelKind {
    /// Minimal number of point pairs required to determine the model.
    pub fn minimal_set_size(&self) -> usize {
        match self {
            ModelKind::Translation => 1,
            ModelKind::Rigid => 2,
            ModelKind::Affine => 3,
        }
    }
}

/// A 2D affine transform.
///
/// Stored row-major:
/// ```text
/// | m00  m01  m02 |
/// | m10  m11  m12 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub m00: f64,
    pub m01: f64,
    pub m02: f64,
    pub m10: f64,
    pub m11: f64,
    pub m12: f64,
}

impl Transform2D {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            m00: 1.0,
            m01: 0.0,
            m02: 0.0,
            m10: 0.0,
            m11: 1.0,
            m12: 0.0,
        }
    }

    /// Pure translation.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m00: 1.0,
            m01: 0.0,
            m02: dx,
            m10: 0.0,
            m11: 1.0,
            m12: dy,
        }
    }

    /// Rotation by `theta` followed by translation.
    pub fn rigid(theta: f64, dx: f64, dy: f64) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self {
            m00: cos,
            m01: -sin,
            m02: dx,
            m10: sin,
            m11: cos,
            m12: dy,
        }
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn apply(&self, p: &Point2D) -> Point2D {
        Point2D::new(
            self.m00 * p.x + self.m01 * p.y + self.m02,
            self.m10 * p.x + self.m11 * p.y + self.m12,
        )
    }

    /// Determinant of the linear part.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Inverse transform, `None` if degenerate.
    pub fn inverse(&self) -> Option<Transform2D> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let m00 = self.m11 * inv_det;
        let m01 = -self.m01 * inv_det;
        let m10 = -self.m10 * inv_det;
        let m11 = self.m00 * inv_det;
        Some(Transform2D {
            m00,
            m01,
            m02: -(m00 * self.m02 + m01 * self.m12),
            m10,
            m11,
            m12: -(m10 * self.m02 + m11 * self.m12),
        })
    }

    /// Map a world point back into the local frame, `None` if degenerate.
    pub fn apply_inverse(&self, p: &Point2D) -> Option<Point2D> {
        self.inverse().map(|inv| inv.apply(p))
    }

    /// Composition `self ∘ other`: `other` is applied first.
    pub fn concat(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            m00: self.m00 * other.m00 + self.m01 * other.m10,
            m01: self.m00 * other.m01 + self.m01 * other.m11,
            m02: self.m00 * other.m02 + self.m01 * other.m12 + self.m02,
            m10: self.m10 * other.m00 + self.m11 * other.m10,
            m11: self.m10 * other.m01 + self.m11 * other.m11,
            m12: self.m10 * other.m02 + self.m11 * other.m12 + self.m12,
        }
    }

    /// Replace `self` with `outer ∘ self`, so `outer` is applied after.
    pub fn pre_concat(&mut self, outer: &Transform2D) {
        *self = outer.concat(self);
    }

    /// Fit a transform of the given kind to weighted point pairs
    /// `(source, target, weight)`.
    ///
    /// Returns `None` when there are fewer pairs than the minimal set size
    /// or the configuration is degenerate (e.g. collinear points for an
    /// affine fit).
    pub fn fit(kind: ModelKind, pairs: &[(Point2D, Point2D, f64)]) -> Option<Transform2D> {
        if pairs.len() < kind.minimal_set_size() {
            return None;
        }
        match kind {
            ModelKind::Translation => fit_translation(pairs),
            ModelKind::Rigid => fit_rigid(pairs),
            ModelKind::Affine => fit_affine(pairs),
        }
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

fn fit_translation(pairs: &[(Point2D, Point2D, f64)]) -> Option<Transform2D> {
    let mut dx = 0.0;
    let mut dy = 0.0;
    let mut ws = 0.0;
    for (p, q, w) in pairs {
        dx += w * (q.x - p.x);
        dy += w * (q.y - p.y);
        ws += w;
    }
    if ws <= 0.0 {
        return None;
    }
    Some(Transform2D::translation(dx / ws, dy / ws))
}

fn fit_rigid(pairs: &[(Point2D, Point2D, f64)]) -> Option<Transform2D> {
    let mut ws = 0.0;
    let mut cpx = 0.0;
    let mut cpy = 0.0;
    let mut cqx = 0.0;
    let mut cqy = 0.0;
    for (p, q, w) in pairs {
        ws += w;
        cpx += w * p.x;
        cpy += w * p.y;
        cqx += w * q.x;
        cqy += w * q.y;
    }
    if ws <= 0.0 {
        return None;
    }
    cpx /= ws;
    cpy /= ws;
    cqx /= ws;
    cqy /= ws;

    // Optimal rotation about the weighted centroids:
    // theta = atan2( Σ w (x p×q), Σ w (p·q) ) on centered coordinates.
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    for (p, q, w) in pairs {
        let x1 = p.x - cpx;
        let y1 = p.y - cpy;
        let x2 = q.x - cqx;
        let y2 = q.y - cqy;
        sin_sum += w * (x1 * y2 - y1 * x2);
        cos_sum += w * (x1 * x2 + y1 * y2);
    }
    let theta = sin_sum.atan2(cos_sum);
    let (sin, cos) = theta.sin_cos();
    Some(Transform2D {
        m00: cos,
        m01: -sin,
        m02: cqx - cos * cpx + sin * cpy,
        m10: sin,
        m11: cos,
        m12: cqy - sin * cpx - cos * cpy,
    })
}

fn fit_affine(pairs: &[(Point2D, Point2D, f64)]) -> Option<Transform2D> {
    // Normal equations with design rows phi = (x, y, 1); the Gram matrix is
    // shared between the x- and y-rows of the affine matrix.
    let mut g = [0.0f64; 9];
    let mut bx = [0.0f64; 3];
    let mut by = [0.0f64; 3];
    for (p, q, w) in pairs {
        let phi = [p.x, p.y, 1.0];
        for r in 0..3 {
            for c in 0..3 {
                g[r * 3 + c] += w * phi[r] * phi[c];
            }
            bx[r] += w * phi[r] * q.x;
            by[r] += w * phi[r] * q.y;
        }
    }
    let rx = solve_sym3(&g, &bx)?;
    let ry = solve_sym3(&g, &by)?;
    Some(Transform2D {
        m00: rx[0],
        m01: rx[1],
        m02: rx[2],
        m10: ry[0],
        m11: ry[1],
        m12: ry[2],
    })
}

/// Solve a symmetric positive-definite 3x3 system via Cholesky.
///
/// Returns `None` when the matrix is not positive definite (degenerate
/// point configuration).
fn solve_sym3(a: &[f64; 9], b: &[f64; 3]) -> Option<[f64; 3]> {
    let mut l = [0.0f64; 9];
    for i in 0..3 {
        for j in 0..=i {
            let mut sum = a[i * 3 + j];
            for k in 0..j {
                sum -= l[i * 3 + k] * l[j * 3 + k];
            }
            if i == j {
                if sum <= 1e-12 {
                    return None;
                }
                l[i * 3 + j] = sum.sqrt();
            } else {
                l[i * 3 + j] = sum / l[j * 3 + j];
            }
        }
    }
    // L * y = b
    let mut y = [0.0f64; 3];
    for i in 0..3 {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * 3 + j] * y[j];
        }
        y[i] = sum / l[i * 3 + i];
    }
    // L^T * x = y
    let mut x = [0.0f64; 3];
    for i in (0..3).rev() {
        let mut sum = y[i];
        for j in (i + 1)..3 {
            sum -= l[j * 3 + i] * x[j];
        }
        x[i] = sum / l[i * 3 + i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pairs_under(
        t: &Transform2D,
        sources: &[Point2D],
    ) -> Vec<(Point2D, Point2D, f64)> {
        sources.iter().map(|p| (*p, t.apply(p), 1.0)).collect()
    }

    #[test]
    fn test_apply_identity() {
        let t = Transform2D::identity();
        let p = Point2D::new(3.0, -2.0);
        assert_eq!(t.apply(&p), p);
    }

    #[test]
    fn test_concat_order() {
        let translate = Transform2D::translation(10.0, 0.0);
        let rotate = Transform2D::rigid(std::f64::consts::FRAC_PI_2, 0.0, 0.0);

        // rotate ∘ translate: translate first, then rotate
        let t = rotate.concat(&translate);
        let p = t.apply(&Point2D::new(0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pre_concat_applies_after() {
        let mut t = Transform2D::translation(1.0, 0.0);
        t.pre_concat(&Transform2D::rigid(std::f64::consts::PI, 0.0, 0.0));
        let p = t.apply(&Point2D::new(0.0, 0.0));
        assert_relative_eq!(p.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform2D::rigid(0.3, 5.0, -7.0);
        let p = Point2D::new(2.0, 11.0);
        let back = t.inverse().unwrap().apply(&t.apply(&p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-10);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-10);
    }

    #[test]
    fn test_inverse_degenerate() {
        let t = Transform2D {
            m00: 0.0,
            m01: 0.0,
            m02: 1.0,
            m10: 0.0,
            m11: 0.0,
            m12: 1.0,
        };
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_fit_translation_exact() {
        let truth = Transform2D::translation(10.0, 5.0);
        let sources = [
            Point2D::new(0.0, 0.0),
            Point2D::new(100.0, 0.0),
            Point2D::new(0.0, 100.0),
        ];
        let fitted =
            Transform2D::fit(ModelKind::Translation, &pairs_under(&truth, &sources)).unwrap();
        assert_relative_eq!(fitted.m02, 10.0, epsilon = 1e-12);
        assert_relative_eq!(fitted.m12, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_rigid_exact() {
        let truth = Transform2D::rigid(0.25, -3.0, 8.0);
        let sources = [
            Point2D::new(0.0, 0.0),
            Point2D::new(50.0, 10.0),
            Point2D::new(12.0, 80.0),
            Point2D::new(90.0, 90.0),
        ];
        let fitted = Transform2D::fit(ModelKind::Rigid, &pairs_under(&truth, &sources)).unwrap();
        for p in &sources {
            let a = truth.apply(p);
            let b = fitted.apply(p);
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_affine_exact() {
        let truth = Transform2D {
            m00: 1.1,
            m01: 0.05,
            m02: 4.0,
            m10: -0.02,
            m11: 0.95,
            m12: -6.0,
        };
        let sources = [
            Point2D::new(0.0, 0.0),
            Point2D::new(100.0, 0.0),
            Point2D::new(0.0, 100.0),
            Point2D::new(100.0, 100.0),
        ];
        let fitted = Transform2D::fit(ModelKind::Affine, &pairs_under(&truth, &sources)).unwrap();
        for p in &sources {
            let a = truth.apply(p);
            let b = fitted.apply(p);
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_affine_collinear_is_none() {
        let pairs: Vec<_> = (0..5)
            .map(|i| {
                let p = Point2D::new(i as f64, 2.0 * i as f64);
                (p, p, 1.0)
            })
            .collect();
        assert!(Transform2D::fit(ModelKind::Affine, &pairs).is_none());
    }

    #[test]
    fn test_fit_below_minimal_set_is_none() {
        let one = [(Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0), 1.0)];
        assert!(Transform2D::fit(ModelKind::Rigid, &one).is_none());
        assert!(Transform2D::fit(ModelKind::Affine, &one).is_none());
        assert!(Transform2D::fit(ModelKind::Translation, &[]).is_none());
    }

    #[test]
    fn test_fit_weight_dominates() {
        // A heavy inlier pair and a light outlier pair: translation should
        // stay close to the heavy pair's displacement.
        let pairs = [
            (Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0), 1.0),
            (Point2D::new(5.0, 5.0), Point2D::new(105.0, 5.0), 0.01),
        ];
        let fitted = Transform2D::fit(ModelKind::Translation, &pairs).unwrap();
        assert!(fitted.m02 < 12.0, "dx = {}", fitted.m02);
    }
}
