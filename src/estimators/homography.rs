//! Homography estimator: 4-point minimal solver and normalised least squares.

use crate::core::Estimator;
use crate::models::Homography;
use crate::types::DataMatrix;
use crate::utils::gauss_elimination;
use nalgebra::{DMatrix, DVector, Matrix3};

/// Smallest |det H| accepted for a normalised homography.
const MIN_DETERMINANT: f64 = 1e-4;
/// Largest |det H| accepted for a normalised homography.
const MAX_DETERMINANT: f64 = 1e4;

/// Direct linear transform homography estimator.
///
/// Both solvers fix `h33 = 1` and work on Hartley-normalised coordinates so
/// pixel-scale inputs stay well conditioned.
#[derive(Debug, Clone, Copy, Default)]
pub struct DltHomographyEstimator;

/// Similarity transforms moving the centroid of each point set to the origin
/// with mean distance `sqrt(2)`.
pub(crate) struct Normalization {
    pub(crate) src: Matrix3<f64>,
    pub(crate) dst: Matrix3<f64>,
    pub(crate) dst_inv: Matrix3<f64>,
}

impl DltHomographyEstimator {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn normalization(data: &DataMatrix, sample: &[usize]) -> Option<Normalization> {
        let n = sample.len() as f64;
        if sample.is_empty() {
            return None;
        }

        let (mut cx1, mut cy1, mut cx2, mut cy2) = (0.0, 0.0, 0.0, 0.0);
        for &idx in sample {
            cx1 += data[(idx, 0)];
            cy1 += data[(idx, 1)];
            cx2 += data[(idx, 2)];
            cy2 += data[(idx, 3)];
        }
        cx1 /= n;
        cy1 /= n;
        cx2 /= n;
        cy2 /= n;

        let (mut d1, mut d2) = (0.0, 0.0);
        for &idx in sample {
            d1 += (data[(idx, 0)] - cx1).hypot(data[(idx, 1)] - cy1);
            d2 += (data[(idx, 2)] - cx2).hypot(data[(idx, 3)] - cy2);
        }
        d1 /= n;
        d2 /= n;

        if d1 < 1e-10 || d2 < 1e-10 {
            return None;
        }

        let s1 = std::f64::consts::SQRT_2 / d1;
        let s2 = std::f64::consts::SQRT_2 / d2;

        Some(Normalization {
            src: Matrix3::new(s1, 0.0, -s1 * cx1, 0.0, s1, -s1 * cy1, 0.0, 0.0, 1.0),
            dst: Matrix3::new(s2, 0.0, -s2 * cx2, 0.0, s2, -s2 * cy2, 0.0, 0.0, 1.0),
            dst_inv: Matrix3::new(1.0 / s2, 0.0, cx2, 0.0, 1.0 / s2, cy2, 0.0, 0.0, 1.0),
        })
    }

    pub(crate) fn apply(t: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
        (t[(0, 0)] * x + t[(0, 2)], t[(1, 1)] * y + t[(1, 2)])
    }

    /// Fill rows `2i` and `2i + 1` of the DLT system for one correspondence.
    fn fill_rows(
        a: &mut DMatrix<f64>,
        b: &mut DVector<f64>,
        i: usize,
        (x1, y1): (f64, f64),
        (x2, y2): (f64, f64),
        weight: f64,
    ) {
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -weight * x1;
        a[(r0, 1)] = -weight * y1;
        a[(r0, 2)] = -weight;
        a[(r0, 6)] = weight * x2 * x1;
        a[(r0, 7)] = weight * x2 * y1;
        b[r0] = -weight * x2;

        a[(r1, 3)] = -weight * x1;
        a[(r1, 4)] = -weight * y1;
        a[(r1, 5)] = -weight;
        a[(r1, 6)] = weight * y2 * x1;
        a[(r1, 7)] = weight * y2 * y1;
        b[r1] = -weight * y2;
    }

    fn denormalize(h: &DVector<f64>, norm: &Normalization) -> Option<Homography> {
        if h.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let model = Homography::new(norm.dst_inv * h_norm * norm.src).normalized();
        model.is_finite().then_some(model)
    }

    fn estimate_minimal_model(&self, data: &DataMatrix, sample: &[usize]) -> Vec<Homography> {
        let Some(norm) = Self::normalization(data, sample) else {
            return Vec::new();
        };

        let mut a = DMatrix::<f64>::zeros(8, 8);
        let mut b = DVector::<f64>::zeros(8);
        for (i, &idx) in sample.iter().enumerate() {
            let p1 = Self::apply(&norm.src, data[(idx, 0)], data[(idx, 1)]);
            let p2 = Self::apply(&norm.dst, data[(idx, 2)], data[(idx, 3)]);
            Self::fill_rows(&mut a, &mut b, i, p1, p2, 1.0);
        }

        let mut augmented = a.insert_column(8, 0.0);
        augmented.set_column(8, &b);

        let mut h = DVector::<f64>::zeros(8);
        if !gauss_elimination(&mut augmented, &mut h) {
            return Vec::new();
        }

        Self::denormalize(&h, &norm).into_iter().collect()
    }

    /// True if three of the given points are (nearly) collinear.
    fn has_collinear_triplet(points: &[(f64, f64)]) -> bool {
        let scale = points
            .iter()
            .flat_map(|&(x, y)| [x.abs(), y.abs()])
            .fold(1.0_f64, f64::max);
        let eps = 1e-9 * scale * scale;
        for a in 0..points.len() {
            for b in (a + 1)..points.len() {
                for c in (b + 1)..points.len() {
                    let (ax, ay) = points[a];
                    let (bx, by) = points[b];
                    let (cx, cy) = points[c];
                    let cross = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
                    if cross.abs() <= eps {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Estimator for DltHomographyEstimator {
    type Model = Homography;

    fn sample_size(&self) -> usize {
        4
    }

    fn is_valid_sample(&self, data: &DataMatrix, sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() {
            return false;
        }
        for i in 0..sample.len() {
            for j in (i + 1)..sample.len() {
                if sample[i] == sample[j] {
                    return false;
                }
            }
        }
        if sample.len() > self.sample_size() {
            return true;
        }
        let src: Vec<(f64, f64)> = sample
            .iter()
            .map(|&idx| (data[(idx, 0)], data[(idx, 1)]))
            .collect();
        let dst: Vec<(f64, f64)> = sample
            .iter()
            .map(|&idx| (data[(idx, 2)], data[(idx, 3)]))
            .collect();
        !Self::has_collinear_triplet(&src) && !Self::has_collinear_triplet(&dst)
    }

    fn estimate_model(&self, data: &DataMatrix, sample: &[usize]) -> Vec<Self::Model> {
        let n = sample.len();
        if n < self.sample_size() {
            return Vec::new();
        }
        if n == self.sample_size() {
            return self.estimate_minimal_model(data, sample);
        }
        self.estimate_model_nonminimal(data, sample, None)
    }

    /// Least squares over every sampled correspondence. `weights`, when given,
    /// is indexed by data row.
    fn estimate_model_nonminimal(
        &self,
        data: &DataMatrix,
        sample: &[usize],
        weights: Option<&[f64]>,
    ) -> Vec<Self::Model> {
        let n = sample.len();
        if n < self.sample_size() {
            return Vec::new();
        }
        let Some(norm) = Self::normalization(data, sample) else {
            return Vec::new();
        };

        let mut coefficients = DMatrix::<f64>::zeros(2 * n, 8);
        let mut inhomogeneous = DVector::<f64>::zeros(2 * n);

        for (i, &idx) in sample.iter().enumerate() {
            let p1 = Self::apply(&norm.src, data[(idx, 0)], data[(idx, 1)]);
            let p2 = Self::apply(&norm.dst, data[(idx, 2)], data[(idx, 3)]);
            let weight = weights.and_then(|w| w.get(idx)).copied().unwrap_or(1.0);
            Self::fill_rows(&mut coefficients, &mut inhomogeneous, i, p1, p2, weight);
        }

        let svd = coefficients.svd(true, true);
        let h = match svd.solve(&inhomogeneous, 1e-12) {
            Ok(h) => h,
            Err(_) => return Vec::new(),
        };

        Self::denormalize(&h, &norm).into_iter().collect()
    }

    fn is_valid_model(
        &self,
        model: &Homography,
        _data: &DataMatrix,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        if !model.is_finite() {
            return false;
        }
        let det = model.normalized().h.determinant().abs();
        det > MIN_DETERMINANT && det < MAX_DETERMINANT
    }
}
