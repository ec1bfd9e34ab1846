//! Core shared types for the correspondence-graph pipeline.
//!
//! Robust estimation works on a dense `DataMatrix` where each row is one
//! correspondence `[x1, y1, x2, y2]`. Feature data uses the `nalgebra` point
//! and matrix types directly.

use nalgebra::{DMatrix, Point2};

/// Dynamic matrix of `f64`, one correspondence per row.
///
/// Estimators, samplers and scoring strategies all operate on this type.
pub type DataMatrix = DMatrix<f64>;

/// Index of an image inside a collection, `0..N`.
pub type ImageIndex = usize;

/// Keypoint location in an image's pixel coordinates.
pub type Keypoint = Point2<f64>;

/// Descriptor set: one fixed-length descriptor per row, index-aligned with the
/// image's keypoints.
pub type Descriptors = DMatrix<f32>;

/// Build a correspondence data matrix from aligned source and destination
/// points.
pub fn correspondence_matrix(src: &[Keypoint], dst: &[Keypoint]) -> DataMatrix {
    let n = src.len().min(dst.len());
    let mut data = DataMatrix::zeros(n, 4);
    for i in 0..n {
        data[(i, 0)] = src[i].x;
        data[(i, 1)] = src[i].y;
        data[(i, 2)] = dst[i].x;
        data[(i, 3)] = dst[i].y;
    }
    data
}
