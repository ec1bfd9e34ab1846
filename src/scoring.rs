//! Scoring primitives.
//!
//! [`Score`] ranks hypotheses by inlier count first and by accumulated inlier
//! residual second. [`RansacInlierCountScoring`] computes it from any residual
//! function; [`reprojection_scoring`] specialises it to the forward transfer
//! error of a homography.

use std::cmp::Ordering;

use nalgebra::Vector3;

use crate::core::Scoring;
use crate::models::Homography;
use crate::types::DataMatrix;

/// Inlier count plus the summed residual of those inliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub inlier_count: usize,
    pub residual_sum: f64,
}

impl Score {
    pub fn new(inlier_count: usize, residual_sum: f64) -> Self {
        Self {
            inlier_count,
            residual_sum,
        }
    }
}

impl PartialOrd for Score {
    /// More inliers is better; with equal counts, a smaller residual is better.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.inlier_count.cmp(&other.inlier_count) {
            Ordering::Equal => other.residual_sum.partial_cmp(&self.residual_sum),
            ord => Some(ord),
        }
    }
}

/// RANSAC-style scoring that counts inliers using a residual function.
///
/// The residual function takes `(data, model, row_index)` and returns a
/// non-negative residual.
pub struct RansacInlierCountScoring<M, F>
where
    F: Fn(&DataMatrix, &M, usize) -> f64,
{
    threshold: f64,
    residual_fn: F,
    _marker: std::marker::PhantomData<M>,
}

impl<M, F> RansacInlierCountScoring<M, F>
where
    F: Fn(&DataMatrix, &M, usize) -> f64,
{
    pub fn new(threshold: f64, residual_fn: F) -> Self {
        Self {
            threshold,
            residual_fn,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn residual(&self, data: &DataMatrix, model: &M, row: usize) -> f64 {
        (self.residual_fn)(data, model, row)
    }
}

impl<M, F> Scoring<M> for RansacInlierCountScoring<M, F>
where
    F: Fn(&DataMatrix, &M, usize) -> f64,
{
    type Score = Score;

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, data: &DataMatrix, model: &M, inliers_out: &mut Vec<usize>) -> Self::Score {
        let n = data.nrows();
        inliers_out.clear();

        let mut residual_sum = 0.0;
        for i in 0..n {
            let r = (self.residual_fn)(data, model, i);
            // NaN residuals fail the comparison and count as outliers.
            if r <= self.threshold {
                inliers_out.push(i);
                residual_sum += r;
            }
        }

        Score::new(inliers_out.len(), residual_sum)
    }
}

/// Forward reprojection error `‖H·p − q‖` of correspondence row `idx`.
///
/// Points mapped to or behind the line at infinity get an infinite error.
pub fn reprojection_error(data: &DataMatrix, model: &Homography, idx: usize) -> f64 {
    let p = model.h * Vector3::new(data[(idx, 0)], data[(idx, 1)], 1.0);
    if p.z.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    let dx = p.x / p.z - data[(idx, 2)];
    let dy = p.y / p.z - data[(idx, 3)];
    (dx * dx + dy * dy).sqrt()
}

/// Homography scoring concrete type used by the fitter.
/// Per-row residual of a homography.
pub type ResidualFn = fn(&DataMatrix, &Homography, usize) -> f64;

pub type ReprojectionScoring = RansacInlierCountScoring<Homography, ResidualFn>;

/// Inlier-count scoring on the forward reprojection error.
pub fn reprojection_scoring(threshold: f64) -> ReprojectionScoring {
    RansacInlierCountScoring::new(threshold, reprojection_error as ResidualFn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scoring;
    use nalgebra::Matrix3;

    #[derive(Clone, Debug)]
    struct UnitModel;

    #[test]
    fn ransac_inlier_count_scoring_counts_correctly() {
        let mut data = DataMatrix::zeros(5, 1);
        data[(0, 0)] = 0.1;
        data[(1, 0)] = 0.4;
        data[(2, 0)] = 0.6;
        data[(3, 0)] = 1.0;
        data[(4, 0)] = 0.3;

        let scoring = RansacInlierCountScoring::new(0.5, |d, _m: &UnitModel, row| d[(row, 0)]);
        let mut inliers = Vec::new();
        let s = scoring.score(&data, &UnitModel, &mut inliers);

        assert_eq!(s.inlier_count, 3);
        assert!((s.residual_sum - 0.8).abs() < 1e-12);
        assert_eq!(inliers, vec![0, 1, 4]);
    }

    #[test]
    fn score_prefers_more_inliers_then_lower_residual() {
        assert!(Score::new(5, 10.0) > Score::new(4, 0.0));
        assert!(Score::new(5, 1.0) > Score::new(5, 2.0));
        assert!(!(Score::new(5, 1.0) > Score::new(5, 1.0)));
    }

    #[test]
    fn reprojection_scoring_uses_forward_error() {
        let mut data = DataMatrix::zeros(2, 4);
        data[(0, 0)] = 1.0;
        data[(0, 1)] = 1.0;
        data[(0, 2)] = 3.0;
        data[(0, 3)] = 1.5;
        data[(1, 0)] = 0.0;
        data[(1, 1)] = 0.0;
        data[(1, 2)] = 9.0;
        data[(1, 3)] = 9.0;

        let h = Homography::new(Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, 0.5, 0.0, 0.0, 1.0));
        let scoring = reprojection_scoring(1.0);
        let mut inliers = Vec::new();
        let s = scoring.score(&data, &h, &mut inliers);
        assert_eq!(s.inlier_count, 1);
        assert_eq!(inliers, vec![0]);
        assert!(reprojection_error(&data, &h, 0) < 1e-12);
    }
}
