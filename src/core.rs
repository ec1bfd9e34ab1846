//! Robust-estimation traits and the RANSAC loop.
//!
//! The fitter is assembled from small components:
//! - [`Estimator`] turns samples into model hypotheses,
//! - [`Sampler`] draws minimal samples,
//! - [`Scoring`] evaluates hypotheses and reports inliers,
//! - [`LocalOptimizer`] refines a model from its inliers,
//! - [`TerminationCriterion`] shrinks the iteration budget adaptively.
//!
//! [`Ransac`] orchestrates them under a hard iteration budget, so a single
//! degenerate correspondence set cannot stall a batch of pairs.

use crate::{settings::RansacSettings, types::DataMatrix};

/// Number of draws attempted per iteration before the iteration is counted
/// as failed.
const MAX_SAMPLE_ATTEMPTS: usize = 100;

/// Estimator responsible for generating model hypotheses from samples.
pub trait Estimator {
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Size of a minimal sample for this estimator.
    fn sample_size(&self) -> usize;

    /// Check whether a given sample is geometrically valid.
    fn is_valid_sample(&self, data: &DataMatrix, sample: &[usize]) -> bool;

    /// Estimate candidate models from a minimal sample.
    fn estimate_model(&self, data: &DataMatrix, sample: &[usize]) -> Vec<Self::Model>;

    /// Estimate from more than a minimal sample, optionally weighted per row.
    fn estimate_model_nonminimal(
        &self,
        data: &DataMatrix,
        sample: &[usize],
        _weights: Option<&[f64]>,
    ) -> Vec<Self::Model> {
        self.estimate_model(data, sample)
    }

    /// Validate a candidate model before scoring.
    fn is_valid_model(
        &self,
        model: &Self::Model,
        data: &DataMatrix,
        sample: &[usize],
        threshold: f64,
    ) -> bool;
}

/// Sampler responsible for drawing minimal samples from the data.
pub trait Sampler {
    /// Draw a sample of `sample_size` elements into `out_indices`.
    ///
    /// Returns `false` if a valid sample could not be drawn (caller may retry).
    fn sample(&mut self, data: &DataMatrix, sample_size: usize, out_indices: &mut [usize]) -> bool;

    /// Update the sampler state given the last sample and iteration.
    fn update(&mut self, sample: &[usize], sample_size: usize, iteration: usize, score_hint: f64);
}

/// Scoring strategy used to evaluate model quality and determine inliers.
pub trait Scoring<M> {
    /// Score type – must support ordering for "better than" comparisons.
    type Score: Clone + PartialOrd;

    /// Inlier/outlier threshold for residuals in the chosen domain.
    fn threshold(&self) -> f64;

    /// Score a model and return its inlier set through `inliers_out`.
    fn score(&self, data: &DataMatrix, model: &M, inliers_out: &mut Vec<usize>) -> Self::Score;
}

/// Local optimization strategy refining a model using its inliers.
pub trait LocalOptimizer<M, S: Clone> {
    /// Returns `(refined_model, refined_score, refined_inliers)`.
    fn run(
        &mut self,
        data: &DataMatrix,
        inliers: &[usize],
        model: &M,
        best_score: &S,
    ) -> (M, S, Vec<usize>);
}

/// Least-squares local optimizer: refits the model on all inliers and
/// re-scores it.
///
/// The refit only replaces the input when it scores better; estimators that
/// cannot fit non-minimal samples simply leave the model unchanged.
pub struct LeastSquaresOptimizer<E, Sc> {
    estimator: E,
    scoring: Sc,
}

impl<E, Sc> LeastSquaresOptimizer<E, Sc>
where
    E: Estimator,
    Sc: Scoring<E::Model>,
{
    pub fn new(estimator: E, scoring: Sc) -> Self {
        Self { estimator, scoring }
    }
}

impl<E, Sc> LocalOptimizer<E::Model, Sc::Score> for LeastSquaresOptimizer<E, Sc>
where
    E: Estimator,
    Sc: Scoring<E::Model>,
{
    fn run(
        &mut self,
        data: &DataMatrix,
        inliers: &[usize],
        model: &E::Model,
        best_score: &Sc::Score,
    ) -> (E::Model, Sc::Score, Vec<usize>) {
        if inliers.len() < self.estimator.sample_size() {
            return (model.clone(), best_score.clone(), inliers.to_vec());
        }

        let mut best = (model.clone(), best_score.clone(), inliers.to_vec());
        let mut refined_inliers = Vec::new();
        for refined in self
            .estimator
            .estimate_model_nonminimal(data, inliers, None)
        {
            if !self
                .estimator
                .is_valid_model(&refined, data, inliers, self.scoring.threshold())
            {
                continue;
            }
            let score = self.scoring.score(data, &refined, &mut refined_inliers);
            if score > best.1 {
                best = (refined, score, refined_inliers.clone());
            }
        }
        best
    }
}

/// Termination criterion deciding when the RANSAC loop can stop.
pub trait TerminationCriterion<S> {
    /// Update the termination state.
    ///
    /// Returns `true` if the algorithm should terminate immediately.
    fn check(
        &mut self,
        data: &DataMatrix,
        best_score: &S,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool;
}

/// Standard RANSAC termination: shrinks the iteration budget using the
/// current inlier ratio and the desired confidence,
/// `N = log(1 - confidence) / log(1 - inlier_ratio^sample_size)`.
pub struct RansacTerminationCriterion {
    /// Desired confidence in \[0, 1\].
    pub confidence: f64,
}

impl TerminationCriterion<crate::scoring::Score> for RansacTerminationCriterion {
    fn check(
        &mut self,
        data: &DataMatrix,
        best_score: &crate::scoring::Score,
        sample_size: usize,
        max_iterations: &mut usize,
    ) -> bool {
        let n = data.nrows() as f64;
        if n <= 0.0 {
            return false;
        }

        let inlier_ratio = (best_score.inlier_count as f64 / n).clamp(0.0, 1.0);
        if inlier_ratio <= 0.0 {
            return false;
        }
        if inlier_ratio >= 1.0 {
            return true;
        }

        let p_good_sample = inlier_ratio.powi(sample_size as i32);
        if p_good_sample <= 0.0 || p_good_sample >= 1.0 {
            return false;
        }

        let log_one_minus_conf = (1.0 - self.confidence).ln();
        let log_one_minus_p = (1.0 - p_good_sample).ln();
        if !log_one_minus_conf.is_finite() || !log_one_minus_p.is_finite() {
            return false;
        }

        let required = (log_one_minus_conf / log_one_minus_p).ceil().max(1.0) as usize;
        if required < *max_iterations {
            *max_iterations = required;
        }
        false
    }
}

/// Generic RANSAC pipeline orchestrating the above components.
pub struct Ransac<E, Sa, Sc, LO, T>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring<E::Model>,
    LO: LocalOptimizer<E::Model, Sc::Score>,
    T: TerminationCriterion<Sc::Score>,
{
    pub settings: RansacSettings,
    pub estimator: E,
    pub sampler: Sa,
    pub scoring: Sc,
    pub local_optimizer: Option<LO>,
    pub final_optimizer: Option<LO>,
    pub termination: T,

    pub best_model: Option<E::Model>,
    pub best_inliers: Vec<usize>,
    pub best_score: Option<Sc::Score>,
    pub iteration: usize,
}

impl<E, Sa, Sc, LO, T> Ransac<E, Sa, Sc, LO, T>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring<E::Model>,
    LO: LocalOptimizer<E::Model, Sc::Score>,
    T: TerminationCriterion<Sc::Score>,
{
    pub fn new(
        settings: RansacSettings,
        estimator: E,
        sampler: Sa,
        scoring: Sc,
        local_optimizer: Option<LO>,
        final_optimizer: Option<LO>,
        termination: T,
    ) -> Self {
        Self {
            settings,
            estimator,
            sampler,
            scoring,
            local_optimizer,
            final_optimizer,
            termination,
            best_model: None,
            best_inliers: Vec::new(),
            best_score: None,
            iteration: 0,
        }
    }

    /// Run the RANSAC loop on the given data matrix.
    ///
    /// Returns `true` if a model was found. The loop never exceeds
    /// `settings.max_iterations`.
    pub fn run(&mut self, data: &DataMatrix) -> bool {
        let sample_size = self.estimator.sample_size();
        let mut sample = vec![0usize; sample_size];
        let mut tmp_inliers = Vec::new();

        let budget = self.settings.max_iterations;
        let mut max_iterations = budget;
        let min_iterations = self.settings.min_iterations.min(budget);

        self.best_inliers.clear();
        self.best_model = None;
        self.best_score = None;
        self.iteration = 0;

        if data.nrows() < sample_size {
            return false;
        }

        let threshold = self.scoring.threshold();

        while self.iteration < max_iterations || self.iteration < min_iterations {
            let mut models: Vec<E::Model> = Vec::new();

            for _ in 0..MAX_SAMPLE_ATTEMPTS {
                if !self.sampler.sample(data, sample_size, &mut sample[..])
                    || !self.estimator.is_valid_sample(data, &sample)
                {
                    self.sampler
                        .update(&sample, sample_size, self.iteration, 0.0);
                    continue;
                }

                models = self.estimator.estimate_model(data, &sample);
                if !models.is_empty() {
                    break;
                }
                self.sampler
                    .update(&sample, sample_size, self.iteration, 0.0);
            }

            if models.is_empty() {
                self.iteration += 1;
                continue;
            }

            let mut iteration_improved_best = false;

            for model in models.iter() {
                if !self
                    .estimator
                    .is_valid_model(model, data, &sample, threshold)
                {
                    continue;
                }

                let score = self.scoring.score(data, model, &mut tmp_inliers);

                let better = match &self.best_score {
                    None => true,
                    Some(best) => score > *best,
                };

                if better {
                    self.best_score = Some(score);
                    self.best_model = Some(model.clone());
                    self.best_inliers.clear();
                    self.best_inliers.extend_from_slice(&tmp_inliers);
                    iteration_improved_best = true;
                }
            }

            if iteration_improved_best {
                if let (Some(lo), Some(best_model), Some(best_score)) = (
                    &mut self.local_optimizer,
                    &self.best_model,
                    &self.best_score,
                ) {
                    let (refined_model, refined_score, refined_inliers) =
                        lo.run(data, &self.best_inliers, best_model, best_score);

                    if refined_score > *best_score {
                        self.best_model = Some(refined_model);
                        self.best_score = Some(refined_score);
                        self.best_inliers = refined_inliers;
                    }
                }

                if let Some(best_score) = &self.best_score {
                    let should_terminate =
                        self.termination
                            .check(data, best_score, sample_size, &mut max_iterations);
                    if should_terminate && self.iteration + 1 >= min_iterations {
                        self.iteration += 1;
                        break;
                    }
                }
            }

            self.sampler
                .update(&sample, sample_size, self.iteration, 0.0);

            self.iteration += 1;
        }

        if let (Some(final_opt), Some(best_model), Some(best_score)) = (
            &mut self.final_optimizer,
            &self.best_model,
            &self.best_score,
        ) {
            if self.best_inliers.len() > sample_size {
                let (refined_model, refined_score, refined_inliers) =
                    final_opt.run(data, &self.best_inliers, best_model, best_score);

                if refined_score > *best_score {
                    self.best_model = Some(refined_model);
                    self.best_score = Some(refined_score);
                    self.best_inliers = refined_inliers;
                }
            }
        }

        self.best_model.is_some()
    }
}
