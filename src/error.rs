//! Error types.
//!
//! Only malformed input is fatal. Pairs that fail to match, fit or validate are
//! reported through [`crate::graph::Rejection`] instead.

use thiserror::Error;

/// Fatal configuration error raised before any pairwise work starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("got {images} images but {features} feature entries")]
    ImageCountMismatch { images: usize, features: usize },
    #[error("image {image} has no keypoints")]
    NoKeypoints { image: usize },
    #[error("image {image} has {keypoints} keypoints but {descriptors} descriptors")]
    DescriptorCountMismatch {
        image: usize,
        keypoints: usize,
        descriptors: usize,
    },
    #[error("image {image} has descriptors of length {found}, expected {expected}")]
    DescriptorLengthMismatch {
        image: usize,
        expected: usize,
        found: usize,
    },
    #[error("image {image} has an empty footprint ({width}x{height})")]
    EmptyImage {
        image: usize,
        width: usize,
        height: usize,
    },
    #[error("feature extraction failed for image {image}: {message}")]
    Extraction { image: usize, message: String },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Failure of a nearest-neighbour matching backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatcherError {
    #[error("descriptor lengths differ: {0} vs {1}")]
    DimensionMismatch(usize, usize),
    #[error("index construction failed: {0}")]
    Index(String),
    #[error("nearest-neighbour search failed: {0}")]
    Search(String),
}
