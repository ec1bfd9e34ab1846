//! Gradient refinement of a homography over its inliers.
//!
//! The cost is the summed squared forward reprojection error, evaluated on
//! Hartley-normalised coordinates with `h33 = 1`, so the eight parameters
//! live on comparable scales.

use argmin::core::{CostFunction, Gradient};
use nalgebra::{DVector, Matrix3, Vector2};

use crate::estimators::DltHomographyEstimator;
use crate::models::Homography;
use crate::types::DataMatrix;

/// Step halvings tried before an iteration is declared stalled.
const MAX_BACKTRACKS: usize = 30;
const GRADIENT_TOLERANCE: f64 = 1e-12;

/// Sum of squared forward reprojection errors of a homography.
pub struct ReprojectionCostFunction {
    src: Vec<Vector2<f64>>,
    dst: Vec<Vector2<f64>>,
}

impl ReprojectionCostFunction {
    pub fn new(src: Vec<Vector2<f64>>, dst: Vec<Vector2<f64>>) -> Self {
        Self { src, dst }
    }

    pub fn to_params(h: &Matrix3<f64>) -> DVector<f64> {
        let h = h / h[(2, 2)];
        DVector::from_row_slice(&[
            h[(0, 0)],
            h[(0, 1)],
            h[(0, 2)],
            h[(1, 0)],
            h[(1, 1)],
            h[(1, 2)],
            h[(2, 0)],
            h[(2, 1)],
        ])
    }

    pub fn from_params(p: &DVector<f64>) -> Matrix3<f64> {
        Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0)
    }
}

impl CostFunction for ReprojectionCostFunction {
    type Param = DVector<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let mut total = 0.0;
        for (p, q) in self.src.iter().zip(&self.dst) {
            let w = param[6] * p.x + param[7] * p.y + 1.0;
            if w.abs() <= f64::EPSILON {
                return Ok(f64::INFINITY);
            }
            let ex = (param[0] * p.x + param[1] * p.y + param[2]) / w - q.x;
            let ey = (param[3] * p.x + param[4] * p.y + param[5]) / w - q.y;
            total += ex * ex + ey * ey;
        }
        Ok(total)
    }
}

impl Gradient for ReprojectionCostFunction {
    type Param = DVector<f64>;
    type Gradient = DVector<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let mut grad = DVector::<f64>::zeros(8);
        for (p, q) in self.src.iter().zip(&self.dst) {
            let u = param[0] * p.x + param[1] * p.y + param[2];
            let v = param[3] * p.x + param[4] * p.y + param[5];
            let w = param[6] * p.x + param[7] * p.y + 1.0;
            if w.abs() <= f64::EPSILON {
                return Err(argmin::core::Error::msg("point mapped to infinity"));
            }
            let ex = u / w - q.x;
            let ey = v / w - q.y;
            let inv_w = 1.0 / w;

            grad[0] += 2.0 * ex * p.x * inv_w;
            grad[1] += 2.0 * ex * p.y * inv_w;
            grad[2] += 2.0 * ex * inv_w;
            grad[3] += 2.0 * ey * p.x * inv_w;
            grad[4] += 2.0 * ey * p.y * inv_w;
            grad[5] += 2.0 * ey * inv_w;

            let common = -(ex * u + ey * v) * inv_w * inv_w;
            grad[6] += 2.0 * common * p.x;
            grad[7] += 2.0 * common * p.y;
        }
        Ok(grad)
    }
}

/// Refine `model` on the `inliers` rows of `data` by backtracking gradient
/// descent.
///
/// Returns `None` when refinement is impossible or does not lower the cost.
pub fn refine_homography(
    data: &DataMatrix,
    inliers: &[usize],
    model: &Homography,
    max_iterations: usize,
) -> Option<Homography> {
    if inliers.len() < 4 || max_iterations == 0 {
        return None;
    }
    let norm = DltHomographyEstimator::normalization(data, inliers)?;
    let src_inv = norm.src.try_inverse()?;

    let (src, dst): (Vec<_>, Vec<_>) = inliers
        .iter()
        .map(|&idx| {
            let (x1, y1) = DltHomographyEstimator::apply(&norm.src, data[(idx, 0)], data[(idx, 1)]);
            let (x2, y2) = DltHomographyEstimator::apply(&norm.dst, data[(idx, 2)], data[(idx, 3)]);
            (Vector2::new(x1, y1), Vector2::new(x2, y2))
        })
        .unzip();

    let h_norm = norm.dst * model.h * src_inv;
    if h_norm[(2, 2)].abs() <= f64::EPSILON {
        return None;
    }

    let cost = ReprojectionCostFunction::new(src, dst);
    let mut params = ReprojectionCostFunction::to_params(&h_norm);
    let initial_cost = cost.cost(&params).ok()?;
    if !initial_cost.is_finite() {
        return None;
    }

    let mut current_cost = initial_cost;
    let mut step = 1.0;
    for _ in 0..max_iterations {
        let Ok(grad) = cost.gradient(&params) else {
            break;
        };
        if grad.norm() < GRADIENT_TOLERANCE {
            break;
        }

        let mut improved = false;
        for _ in 0..MAX_BACKTRACKS {
            let candidate = &params - step * &grad;
            match cost.cost(&candidate) {
                Ok(c) if c < current_cost => {
                    params = candidate;
                    current_cost = c;
                    improved = true;
                    break;
                }
                _ => step *= 0.5,
            }
        }
        if !improved {
            break;
        }
        step *= 2.0;
    }

    if current_cost >= initial_cost {
        return None;
    }

    let refined = norm.dst_inv * ReprojectionCostFunction::from_params(&params) * norm.src;
    let refined = Homography::new(refined).normalized();
    refined.is_finite().then_some(refined)
}
