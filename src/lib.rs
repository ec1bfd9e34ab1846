//! # panograph - pairwise homography graphs for panorama stitching
//!
//! `panograph` decides, for every pair of images in a collection, whether a
//! reliable planar projective relation exists between them, estimates it, and
//! records it in a [`CorrespondenceGraph`] that global alignment can consume.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use panograph::{FeatureCatalog, GraphSettings, ImageFeatures, ImageSize, Pipeline};
//! use panograph::types::Descriptors;
//! use nalgebra::Point2;
//!
//! # fn load() -> Vec<ImageFeatures> {
//! #     let size = ImageSize::new(640, 480);
//! #     let keypoints = vec![Point2::new(1.0, 2.0)];
//! #     let image = ImageFeatures::new(size, keypoints, Descriptors::zeros(1, 128));
//! #     vec![image; 2]
//! # }
//! let catalog = FeatureCatalog::new(load());
//! let pipeline = Pipeline::new(GraphSettings::default()).unwrap();
//! let graph = pipeline.run(&catalog).unwrap();
//!
//! let adjacency = graph.adjacency_matrix();
//! if let Some(h) = graph.homography(0, 1) {
//!     println!("H(0, 1) = {h}, {} inliers", graph.inliers(0, 1));
//! }
//! println!("{adjacency}");
//! ```
//!
//! ## Stages
//!
//! 1. **Matching** ([`matching`]): k-NN descriptor search for every ordered
//!    pair, filtered by the ratio test; pairs with too few good matches keep
//!    an empty list.
//! 2. **Pruning** ([`pruning`]): each image keeps its `maximum_matches` best
//!    neighbours.
//! 3. **Estimation** ([`estimation`], [`fitter`]): RANSAC homography fit per
//!    unordered pair, attempted if either direction survived pruning.
//! 4. **Validation** ([`validation`]): inlier support must dominate the
//!    number of correspondences in the footprint overlap.
//! 5. **Assembly** ([`graph`]): symmetric homographies, inlier counts and the
//!    adjacency matrix.
//!
//! ## Extending
//!
//! The robust fitter is assembled from the traits in [`core`]:
//!
//! - **[`Estimator`](core::Estimator)**: model hypotheses from samples
//! - **[`Sampler`](core::Sampler)**: minimal-sample strategies
//! - **[`Scoring<M>`](core::Scoring)**: model quality and inliers
//! - **[`LocalOptimizer<M, S>`](core::LocalOptimizer)**: polishing from inliers
//! - **[`TerminationCriterion<S>`](core::TerminationCriterion)**: adaptive stopping
//!
//! Whole stages can be swapped at the collaborator seams:
//! [`FeatureExtractor`], [`Matcher`](matching::Matcher) and
//! [`GeometricFitter`].

pub mod core;
pub mod error;
pub mod estimation;
pub mod estimators;
pub mod features;
pub mod fitter;
pub mod graph;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod pruning;
pub mod refinement;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod utils;
pub mod validation;

pub use crate::core::{Estimator, LocalOptimizer, Sampler, Scoring, TerminationCriterion};
pub use error::{MatcherError, PipelineError};
pub use features::{FeatureCatalog, FeatureExtractor, ImageFeatures, ImageSize};
pub use fitter::{FitResult, GeometricFitter, RansacHomographyFitter};
pub use graph::{CorrespondenceGraph, PairKey, PairRecord, PairState, Rejection};
pub use matching::{Match, MatchTable, PairMatcher};
pub use models::Homography;
pub use pipeline::Pipeline;
pub use settings::{GraphSettings, MatchingMode, RansacSettings};
