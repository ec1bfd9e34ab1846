//! Per-pair homography estimation from a pruned match list.

use log::debug;

use crate::features::ImageFeatures;
use crate::fitter::GeometricFitter;
use crate::graph::Rejection;
use crate::matching::Match;
use crate::models::Homography;
use crate::types::Keypoint;

/// Source and destination points of a match list.
///
/// Points are ordered by ascending match distance; `match_order[k]` is the
/// position in the match list of correspondence `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSet {
    pub src: Vec<Keypoint>,
    pub dst: Vec<Keypoint>,
    pub match_order: Vec<usize>,
}

impl CorrespondenceSet {
    /// Resolve every match against the keypoints of both images. `None` if a
    /// match refers to a keypoint that does not exist.
    pub fn from_matches(
        matches: &[Match],
        from: &ImageFeatures,
        to: &ImageFeatures,
    ) -> Option<Self> {
        let mut match_order: Vec<usize> = (0..matches.len()).collect();
        match_order.sort_by(|&a, &b| matches[a].distance.total_cmp(&matches[b].distance));

        let mut src = Vec::with_capacity(matches.len());
        let mut dst = Vec::with_capacity(matches.len());
        for &k in &match_order {
            let m = &matches[k];
            src.push(*from.keypoints.get(m.query_idx)?);
            dst.push(*to.keypoints.get(m.train_idx)?);
        }
        Some(Self {
            src,
            dst,
            match_order,
        })
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// A fitted homography with its inlier mask over the correspondence set.
#[derive(Debug, Clone, PartialEq)]
pub struct PairEstimate {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub correspondences: CorrespondenceSet,
}

impl PairEstimate {
    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&m| m).count()
    }

    /// The inlier matches of `matches`, in their original order.
    pub fn inlier_matches(&self, matches: &[Match]) -> Vec<Match> {
        let mut keep: Vec<usize> = self
            .correspondences
            .match_order
            .iter()
            .zip(&self.inlier_mask)
            .filter_map(|(&k, &inlier)| inlier.then_some(k))
            .collect();
        keep.sort_unstable();
        keep.into_iter().map(|k| matches[k]).collect()
    }
}

/// Builds correspondence sets and hands them to a [`GeometricFitter`].
pub struct HomographyEstimator<F> {
    fitter: F,
    /// Reprojection tolerance in pixels.
    pub tolerance: f64,
    /// Fewer correspondences than this never reach the fitter.
    pub min_correspondences: usize,
}

impl<F: GeometricFitter> HomographyEstimator<F> {
    pub fn new(fitter: F, tolerance: f64, min_correspondences: usize) -> Self {
        Self {
            fitter,
            tolerance,
            min_correspondences: min_correspondences.max(4),
        }
    }

    /// Fit `from -> to` over `matches`.
    ///
    /// A missing homography is an ordinary outcome reported as a
    /// [`Rejection`].
    pub fn estimate(
        &self,
        from: &ImageFeatures,
        to: &ImageFeatures,
        matches: &[Match],
        seed: u64,
    ) -> Result<PairEstimate, Rejection> {
        let correspondences = CorrespondenceSet::from_matches(matches, from, to)
            .ok_or(Rejection::InsufficientCorrespondences)?;
        if correspondences.len() < self.min_correspondences {
            return Err(Rejection::InsufficientCorrespondences);
        }

        let fit = self
            .fitter
            .fit(&correspondences.src, &correspondences.dst, self.tolerance, seed);
        let Some(homography) = fit.homography else {
            debug!(
                "No homography after {} iterations over {} correspondences",
                fit.iterations,
                correspondences.len()
            );
            return Err(Rejection::FitterNonConvergence);
        };
        if fit.inlier_mask.len() != correspondences.len() {
            return Err(Rejection::FitterNonConvergence);
        }

        Ok(PairEstimate {
            homography,
            inlier_mask: fit.inlier_mask,
            correspondences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ImageSize;
    use crate::fitter::{FitResult, RansacHomographyFitter};
    use crate::types::Descriptors;
    use nalgebra::Point2;

    fn image(points: Vec<Keypoint>) -> ImageFeatures {
        let n = points.len();
        ImageFeatures::new(ImageSize::new(200, 200), points, Descriptors::zeros(n, 4))
    }

    struct FixedFitter(Option<Homography>);

    impl GeometricFitter for FixedFitter {
        fn fit(
            &self,
            src: &[Keypoint],
            _dst: &[Keypoint],
            _tolerance: f64,
            _seed: u64,
        ) -> FitResult {
            FitResult {
                homography: self.0.clone(),
                inlier_mask: (0..src.len()).map(|k| k % 2 == 0).collect(),
                iterations: 1,
            }
        }
    }

    #[test]
    fn correspondences_follow_match_distance() {
        let a = image(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)]);
        let b = image(vec![Point2::new(5.0, 5.0), Point2::new(6.0, 5.0), Point2::new(7.0, 5.0)]);
        let matches = [Match::new(0, 2, 0.9), Match::new(1, 1, 0.1), Match::new(2, 0, 0.5)];
        let set = CorrespondenceSet::from_matches(&matches, &a, &b).unwrap();
        assert_eq!(set.match_order, vec![1, 2, 0]);
        assert_eq!(set.src[0], Point2::new(1.0, 0.0));
        assert_eq!(set.dst[2], Point2::new(7.0, 5.0));

        let bad = [Match::new(0, 9, 0.0)];
        assert!(CorrespondenceSet::from_matches(&bad, &a, &b).is_none());
    }

    #[test]
    fn too_few_correspondences_never_reach_the_fitter() {
        let pts: Vec<Keypoint> = (0..3).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        let a = image(pts.clone());
        let matches: Vec<Match> = (0..3).map(|i| Match::new(i, i, 0.0)).collect();
        let estimator = HomographyEstimator::new(FixedFitter(Some(Homography::identity())), 1.0, 4);
        assert_eq!(
            estimator.estimate(&a, &a, &matches, 0),
            Err(Rejection::InsufficientCorrespondences)
        );
    }

    #[test]
    fn fitter_failure_is_a_rejection() {
        let pts: Vec<Keypoint> = (0..6).map(|i| Point2::new(i as f64, (i * i) as f64)).collect();
        let a = image(pts);
        let matches: Vec<Match> = (0..6).map(|i| Match::new(i, i, 0.0)).collect();
        let estimator = HomographyEstimator::new(FixedFitter(None), 1.0, 4);
        assert_eq!(
            estimator.estimate(&a, &a, &matches, 0),
            Err(Rejection::FitterNonConvergence)
        );
    }

    #[test]
    fn inlier_matches_keep_list_order() {
        let pts: Vec<Keypoint> = (0..6).map(|i| Point2::new(i as f64, (i * i) as f64)).collect();
        let a = image(pts);
        let matches: Vec<Match> = (0..6).map(|i| Match::new(i, i, (6 - i) as f32)).collect();
        let estimator = HomographyEstimator::new(FixedFitter(Some(Homography::identity())), 1.0, 4);
        let estimate = estimator.estimate(&a, &a, &matches, 0).unwrap();
        // set order is 5,4,3,2,1,0; even set positions are inliers
        let kept: Vec<usize> = estimate
            .inlier_matches(&matches)
            .iter()
            .map(|m| m.query_idx)
            .collect();
        assert_eq!(kept, vec![1, 3, 5]);
        assert_eq!(estimate.inlier_count(), 3);
    }

    #[test]
    fn identical_images_give_identity() {
        let pts: Vec<Keypoint> = (0..40)
            .map(|i| {
                let (row, col) = ((i / 8) as f64, (i % 8) as f64);
                Point2::new(5.0 + 4.7 * col + row, 7.0 + 9.1 * row + 0.3 * col)
            })
            .collect();
        let a = image(pts);
        let matches: Vec<Match> = (0..40).map(|i| Match::new(i, i, 0.0)).collect();
        let estimator = HomographyEstimator::new(RansacHomographyFitter::default(), 1.0, 4);
        let estimate = estimator.estimate(&a, &a, &matches, 3).unwrap();
        assert!(estimate.homography.is_identity(1e-6));
        assert_eq!(estimate.inlier_count(), 40);
    }
}
