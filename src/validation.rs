//! Overlap-consistency check on fitted homographies.
//!
//! RANSAC accepts any transform that explains enough correspondences within
//! the reprojection tolerance. The validator additionally demands that the
//! inlier support is large relative to the number of correspondences lying
//! in the region where the two image footprints overlap under `H`.

use nalgebra::Point2;

use crate::features::ImageSize;
use crate::models::Homography;
use crate::types::Keypoint;

/// Pixels of the source image covered by the destination footprint warped
/// forward with `H`.
///
/// Warping the destination's all-ones mask by `H` samples it at `H⁻¹·p`, so a
/// source pixel `p` is covered iff `H⁻¹·p` lands inside the destination image.
#[derive(Debug, Clone)]
pub struct OverlapRegion {
    from: ImageSize,
    to: ImageSize,
    inverse: Option<Homography>,
}

impl OverlapRegion {
    /// A singular `homography` covers nothing.
    pub fn new(from: ImageSize, to: ImageSize, homography: &Homography) -> Self {
        Self {
            from,
            to,
            inverse: homography.inverse(),
        }
    }

    /// Membership of the source pixel `(x, y)`; coordinates are truncated to
    /// the integer pixel grid first.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (x, y) = (x.trunc(), y.trunc());
        if !self.from.contains(x, y) {
            return false;
        }
        self.inverse
            .as_ref()
            .and_then(|inv| inv.transform_point(&Point2::new(x, y)))
            .is_some_and(|q| self.to.contains(q.x, q.y))
    }

    /// Number of `points` inside the overlap.
    pub fn count_inside(&self, points: &[Keypoint]) -> usize {
        points.iter().filter(|p| self.contains(p.x, p.y)).count()
    }
}

/// Quantities behind one accept/reject decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationReport {
    /// Inlier count of the fit.
    pub area: usize,
    /// Source correspondence points inside the overlap region.
    pub overlapping_matches: usize,
    /// `alpha + beta * overlapping_matches`.
    pub threshold: f64,
    pub accepted: bool,
}

/// Accepts a homography iff `area > alpha + beta * overlapping_matches`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomographyValidator {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for HomographyValidator {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            beta: 0.3,
        }
    }
}

impl HomographyValidator {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    pub fn evaluate(
        &self,
        homography: &Homography,
        from: ImageSize,
        to: ImageSize,
        src_points: &[Keypoint],
        inlier_mask: &[bool],
    ) -> ValidationReport {
        let area = inlier_mask.iter().filter(|&&m| m).count();
        let overlapping_matches =
            OverlapRegion::new(from, to, homography).count_inside(src_points);
        let threshold = self.alpha + self.beta * overlapping_matches as f64;
        ValidationReport {
            area,
            overlapping_matches,
            threshold,
            accepted: area as f64 > threshold,
        }
    }

    /// A missing homography is always rejected.
    pub fn accept(
        &self,
        homography: Option<&Homography>,
        from: ImageSize,
        to: ImageSize,
        src_points: &[Keypoint],
        inlier_mask: &[bool],
    ) -> bool {
        homography.is_some_and(|h| self.evaluate(h, from, to, src_points, inlier_mask).accepted)
    }
}
