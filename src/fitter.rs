//! Robust projective fitting of point correspondences.
//!
//! [`GeometricFitter`] is the seam the estimation stage talks to;
//! [`RansacHomographyFitter`] is the stock implementation assembled from the
//! [`core`](crate::core) components.

use log::debug;

use crate::core::{
    Estimator, LeastSquaresOptimizer, Ransac, RansacTerminationCriterion, Sampler, Scoring,
};
use crate::estimators::DltHomographyEstimator;
use crate::models::Homography;
use crate::refinement::refine_homography;
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{reprojection_scoring, ReprojectionScoring};
use crate::settings::{LocalOptimizationType, RansacSettings, SamplerType};
use crate::types::{correspondence_matrix, DataMatrix, Keypoint};

/// Outcome of a fit: a homography (or `None`) and an inlier mask aligned with
/// the input correspondences.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub homography: Option<Homography>,
    pub inlier_mask: Vec<bool>,
    /// RANSAC iterations spent.
    pub iterations: usize,
}

impl FitResult {
    pub fn failed(len: usize, iterations: usize) -> Self {
        Self {
            homography: None,
            inlier_mask: vec![false; len],
            iterations,
        }
    }

    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&m| m).count()
    }
}

/// Fits a projective transform mapping `src` onto `dst`.
///
/// Implementations must be deterministic for a given `seed` and may assume
/// the correspondences are ordered best-first.
pub trait GeometricFitter: Sync {
    fn fit(&self, src: &[Keypoint], dst: &[Keypoint], tolerance: f64, seed: u64) -> FitResult;
}

/// RANSAC homography fitter with least-squares polishing and optional
/// reprojection refinement.
#[derive(Debug, Clone, Default)]
pub struct RansacHomographyFitter {
    pub settings: RansacSettings,
}

type HomographyLsq = LeastSquaresOptimizer<DltHomographyEstimator, ReprojectionScoring>;

impl RansacHomographyFitter {
    pub fn new(settings: RansacSettings) -> Self {
        Self { settings }
    }

    fn optimizer(kind: LocalOptimizationType, threshold: f64) -> Option<HomographyLsq> {
        match kind {
            LocalOptimizationType::None => None,
            LocalOptimizationType::Lsq => Some(LeastSquaresOptimizer::new(
                DltHomographyEstimator::new(),
                reprojection_scoring(threshold),
            )),
        }
    }

    fn run_with<Sa: Sampler>(
        &self,
        settings: RansacSettings,
        sampler: Sa,
        data: &DataMatrix,
    ) -> (Option<(Homography, Vec<usize>)>, usize) {
        let threshold = settings.inlier_threshold;
        let termination = RansacTerminationCriterion {
            confidence: settings.confidence,
        };
        let local = Self::optimizer(settings.local_optimization, threshold);
        let last = Self::optimizer(settings.final_optimization, threshold);

        let mut ransac = Ransac::new(
            settings,
            DltHomographyEstimator::new(),
            sampler,
            reprojection_scoring(threshold),
            local,
            last,
            termination,
        );
        ransac.run(data);

        let iterations = ransac.iteration;
        match ransac.best_model.take() {
            Some(model) => (Some((model, std::mem::take(&mut ransac.best_inliers))), iterations),
            None => (None, iterations),
        }
    }

    /// Reprojection refinement, kept only if no inlier is lost.
    fn refine(
        &self,
        data: &DataMatrix,
        model: Homography,
        inliers: Vec<usize>,
    ) -> (Homography, Vec<usize>) {
        let iterations = self.settings.refine_iterations;
        let Some(refined) = refine_homography(data, &inliers, &model, iterations) else {
            return (model, inliers);
        };
        if !DltHomographyEstimator::new().is_valid_model(&refined, data, &inliers, 0.0) {
            return (model, inliers);
        }
        let scoring = reprojection_scoring(self.settings.inlier_threshold);
        let mut refined_inliers = Vec::new();
        scoring.score(data, &refined, &mut refined_inliers);
        if refined_inliers.len() >= inliers.len() {
            (refined, refined_inliers)
        } else {
            (model, inliers)
        }
    }
}

impl GeometricFitter for RansacHomographyFitter {
    fn fit(&self, src: &[Keypoint], dst: &[Keypoint], tolerance: f64, seed: u64) -> FitResult {
        let n = src.len();
        let estimator = DltHomographyEstimator::new();
        if n != dst.len() || n < estimator.sample_size() {
            return FitResult::failed(n, 0);
        }

        let data = correspondence_matrix(src, dst);
        let settings = RansacSettings {
            inlier_threshold: tolerance,
            seed,
            ..self.settings.clone()
        };

        let (best, iterations) = match settings.sampler {
            SamplerType::Uniform => {
                self.run_with(settings.clone(), UniformRandomSampler::from_seed(seed), &data)
            }
            SamplerType::Prosac => {
                self.run_with(settings.clone(), ProsacSampler::from_seed(seed), &data)
            }
        };

        let Some((mut model, mut inliers)) = best else {
            debug!("RANSAC found no model in {iterations} iterations over {n} correspondences");
            return FitResult::failed(n, iterations);
        };

        if settings.refine && inliers.len() > estimator.sample_size() {
            (model, inliers) = self.refine(&data, model, inliers);
        }

        debug!(
            "RANSAC: {} / {} inliers after {} iterations",
            inliers.len(),
            n,
            iterations
        );

        let mut inlier_mask = vec![false; n];
        for idx in inliers {
            inlier_mask[idx] = true;
        }
        FitResult {
            homography: Some(model),
            inlier_mask,
            iterations,
        }
    }
}
