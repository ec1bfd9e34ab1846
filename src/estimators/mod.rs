//! Estimators for geometric models.

pub mod homography;

pub use homography::DltHomographyEstimator;

#[cfg(test)]
mod tests {
    use super::DltHomographyEstimator;
    use crate::core::Estimator;
    use crate::models::Homography;
    use crate::types::DataMatrix;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Point2};

    fn data_from(h: &Homography, points: &[(f64, f64)]) -> DataMatrix {
        let mut data = DataMatrix::zeros(points.len(), 4);
        for (i, &(x, y)) in points.iter().enumerate() {
            let q = h.transform_point(&Point2::new(x, y)).unwrap();
            data[(i, 0)] = x;
            data[(i, 1)] = y;
            data[(i, 2)] = q.x;
            data[(i, 3)] = q.y;
        }
        data
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            0.98, -0.12, 35.0, 0.09, 1.03, -12.0, 2e-5, -1e-5, 1.0,
        ))
    }

    #[test]
    fn homography_estimator_recovers_simple_translation() {
        let h = Homography::new(Matrix3::new(1.0, 0.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 1.0));
        let data = data_from(&h, &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);

        let estimator = DltHomographyEstimator::new();
        let sample = [0usize, 1, 2, 3];

        assert!(estimator.is_valid_sample(&data, &sample));
        let models = estimator.estimate_model(&data, &sample);
        assert_eq!(models.len(), 1);
        assert!(estimator.is_valid_model(&models[0], &data, &sample, 0.0));
        assert_relative_eq!(models[0].h, h.h, epsilon = 1e-9);
    }

    #[test]
    fn minimal_solver_recovers_projective_map_in_pixels() {
        let h = ground_truth();
        let data = data_from(&h, &[(10.0, 20.0), (620.0, 15.0), (600.0, 470.0), (25.0, 455.0)]);
        let estimator = DltHomographyEstimator::new();
        let models = estimator.estimate_model(&data, &[0, 1, 2, 3]);
        assert_eq!(models.len(), 1);
        assert_relative_eq!(models[0].h, h.h, epsilon = 1e-7, max_relative = 1e-7);
    }

    #[test]
    fn nonminimal_solver_fits_all_points() {
        let h = ground_truth();
        let points: Vec<(f64, f64)> = (0..25)
            .map(|i| (30.0 + 23.0 * (i % 5) as f64 * 5.0, 40.0 + 17.0 * (i / 5) as f64 * 5.0))
            .collect();
        let data = data_from(&h, &points);
        let sample: Vec<usize> = (0..points.len()).collect();
        let estimator = DltHomographyEstimator::new();
        let models = estimator.estimate_model(&data, &sample);
        assert_eq!(models.len(), 1);
        assert_relative_eq!(models[0].h, h.h, epsilon = 1e-7, max_relative = 1e-7);
    }

    #[test]
    fn collinear_and_repeated_samples_are_rejected() {
        let h = ground_truth();
        let data = data_from(&h, &[(0.0, 0.0), (10.0, 10.0), (20.0, 20.0), (5.0, 40.0)]);
        let estimator = DltHomographyEstimator::new();
        assert!(!estimator.is_valid_sample(&data, &[0, 1, 2, 3]));
        assert!(!estimator.is_valid_sample(&data, &[0, 0, 1, 3]));
        assert!(!estimator.is_valid_sample(&data, &[0, 1, 3]));
    }

    #[test]
    fn degenerate_models_are_invalid() {
        let estimator = DltHomographyEstimator::new();
        let data = DataMatrix::zeros(4, 4);
        let flat = Homography::new(Matrix3::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0));
        assert!(!estimator.is_valid_model(&flat, &data, &[0, 1, 2, 3], 1.0));
        let nan = Homography::new(Matrix3::from_element(f64::NAN));
        assert!(!estimator.is_valid_model(&nan, &data, &[0, 1, 2, 3], 1.0));
    }
}
