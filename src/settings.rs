//! Configuration types for the robust fitter and the graph pipeline.
//!
//! Every struct carries its documented defaults through `Default` and
//! deserializes from partial configs (`#[serde(default)]`), so a config file
//! only needs to name the knobs it changes.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Sampling strategy for minimal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    Uniform,
    /// Progressive sampling over correspondences ordered by match quality.
    Prosac,
}

/// Local optimization applied whenever the best model improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalOptimizationType {
    None,
    Lsq,
}

/// Nearest-neighbour backend used by the pair matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Brute-force L2 search over every descriptor.
    Exhaustive,
    /// HNSW index search.
    Approximate,
}

/// Settings of the RANSAC homography fitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacSettings {
    /// Minimum number of iterations, clamped to `max_iterations`.
    pub min_iterations: usize,
    /// Hard iteration budget; a degenerate pair can never run longer.
    pub max_iterations: usize,
    /// Reprojection tolerance in pixels.
    pub inlier_threshold: f64,
    /// Desired confidence in \[0, 1\] used by adaptive termination.
    pub confidence: f64,
    pub sampler: SamplerType,
    pub local_optimization: LocalOptimizationType,
    pub final_optimization: LocalOptimizationType,
    /// Run gradient refinement of the reprojection error after the final fit.
    pub refine: bool,
    /// Iteration cap of the gradient refinement.
    pub refine_iterations: usize,
    /// RNG seed; identical seeds give identical fits.
    pub seed: u64,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            min_iterations: 0,
            max_iterations: 500,
            inlier_threshold: 1.0,
            confidence: 0.995,
            sampler: SamplerType::Uniform,
            local_optimization: LocalOptimizationType::Lsq,
            final_optimization: LocalOptimizationType::Lsq,
            refine: true,
            refine_iterations: 20,
            seed: 0,
        }
    }
}

/// Configuration surface of the correspondence-graph pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub matching_mode: MatchingMode,
    /// Neighbours requested per query descriptor.
    pub k: usize,
    /// Ratio-test threshold.
    pub ratio: f32,
    /// A pair keeps its matches only if strictly more good matches survive.
    pub match_threshold: usize,
    /// Neighbouring images retained per image after pruning.
    pub maximum_matches: usize,
    /// Minimum correspondences before a fit is attempted.
    pub feature_correspondences: usize,
    /// RANSAC iteration budget per pair.
    pub ransac_iterations: usize,
    /// Reprojection tolerance in pixels.
    pub reprojection_tolerance: f64,
    /// Validator intercept.
    pub alpha: f64,
    /// Validator slope on overlapping matches.
    pub beta: f64,
    /// Base seed mixed with the pair indices for every fit.
    pub seed: u64,
    pub refine_homographies: bool,
    /// Use the rayon thread pool for matching and estimation.
    pub parallel: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            matching_mode: MatchingMode::Exhaustive,
            k: 2,
            ratio: 0.7,
            match_threshold: 100,
            maximum_matches: 6,
            feature_correspondences: 4,
            ransac_iterations: 500,
            reprojection_tolerance: 1.0,
            alpha: 0.8,
            beta: 0.3,
            seed: 0,
            refine_homographies: true,
            parallel: true,
        }
    }
}

impl GraphSettings {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidSettings(msg));
        if self.k < 2 {
            return invalid(format!("k must be at least 2 for the ratio test, got {}", self.k));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return invalid(format!("ratio must lie in (0, 1], got {}", self.ratio));
        }
        if self.maximum_matches == 0 {
            return invalid("maximum_matches must be positive".to_string());
        }
        if self.feature_correspondences < 4 {
            return invalid(format!(
                "a homography needs at least 4 correspondences, got {}",
                self.feature_correspondences
            ));
        }
        if self.ransac_iterations == 0 {
            return invalid("ransac_iterations must be positive".to_string());
        }
        if !(self.reprojection_tolerance > 0.0) {
            return invalid(format!(
                "reprojection_tolerance must be positive, got {}",
                self.reprojection_tolerance
            ));
        }
        Ok(())
    }

    /// Fitter settings derived from the pipeline configuration.
    pub fn ransac_settings(&self) -> RansacSettings {
        RansacSettings {
            max_iterations: self.ransac_iterations,
            inlier_threshold: self.reprojection_tolerance,
            refine: self.refine_homographies,
            seed: self.seed,
            ..RansacSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_graph_settings_match_documented_defaults() {
        let cfg = GraphSettings::default();
        assert_eq!(cfg.matching_mode, MatchingMode::Exhaustive);
        assert_eq!(cfg.k, 2);
        assert!((cfg.ratio - 0.7).abs() < 1e-6);
        assert_eq!(cfg.match_threshold, 100);
        assert_eq!(cfg.maximum_matches, 6);
        assert_eq!(cfg.feature_correspondences, 4);
        assert_eq!(cfg.ransac_iterations, 500);
        assert!((cfg.reprojection_tolerance - 1.0).abs() < 1e-12);
        assert!((cfg.alpha - 0.8).abs() < 1e-12);
        assert!((cfg.beta - 0.3).abs() < 1e-12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn ransac_settings_follow_graph_settings() {
        let cfg = GraphSettings {
            ransac_iterations: 42,
            reprojection_tolerance: 2.5,
            seed: 7,
            ..GraphSettings::default()
        };
        let ransac = cfg.ransac_settings();
        assert_eq!(ransac.max_iterations, 42);
        assert_eq!(ransac.seed, 7);
        assert!((ransac.inlier_threshold - 2.5).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_k = GraphSettings {
            k: 1,
            ..GraphSettings::default()
        };
        assert!(matches!(bad_k.validate(), Err(PipelineError::InvalidSettings(_))));

        let bad_ratio = GraphSettings {
            ratio: 1.5,
            ..GraphSettings::default()
        };
        assert!(bad_ratio.validate().is_err());

        let bad_fit = GraphSettings {
            feature_correspondences: 3,
            ..GraphSettings::default()
        };
        assert!(bad_fit.validate().is_err());

        let bad_tol = GraphSettings {
            reprojection_tolerance: 0.0,
            ..GraphSettings::default()
        };
        assert!(bad_tol.validate().is_err());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let cfg: GraphSettings =
            serde_json::from_str(r#"{ "matching_mode": "approximate", "maximum_matches": 3 }"#)
                .unwrap();
        assert_eq!(cfg.matching_mode, MatchingMode::Approximate);
        assert_eq!(cfg.maximum_matches, 3);
        assert_eq!(cfg.match_threshold, 100);
    }
}
