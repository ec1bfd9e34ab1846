//! Geometric models estimated between image pairs.

use nalgebra::{Matrix3, Point2, Vector3};

/// Planar projective transformation represented by a 3x3 matrix.
///
/// `h` maps homogeneous points of the source image into the destination image.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Scale so that `h[(2, 2)] == 1` when that entry is not vanishing.
    pub fn normalized(&self) -> Self {
        let scale = self.h[(2, 2)];
        if scale.abs() > f64::EPSILON {
            Self::new(self.h / scale)
        } else {
            self.clone()
        }
    }

    /// Exact matrix inverse, or `None` when the matrix is singular.
    ///
    /// The result is not rescaled, so `h * inverse.h` is the identity itself
    /// and not a multiple of it.
    pub fn inverse(&self) -> Option<Self> {
        self.h
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .map(Self::new)
    }

    /// Map a point; `None` if it lands on or behind the line at infinity.
    pub fn transform_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let q = self.h * Vector3::new(p.x, p.y, 1.0);
        if q.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(q.x / q.z, q.y / q.z))
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }

    /// True if the normalised matrix is within `tol` of the identity.
    pub fn is_identity(&self, tol: f64) -> bool {
        (self.normalized().h - Matrix3::identity()).abs().max() < tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.1, 0.05, 12.0, //
            -0.02, 0.95, -4.0, //
            1e-4, 2e-5, 1.0,
        ));
        let inv = h.inverse().unwrap();
        let p = Point2::new(120.0, 45.0);
        let q = h.transform_point(&p).unwrap();
        let back = inv.transform_point(&q).unwrap();
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn projective_inverse_is_exact_without_rescaling() {
        let h = Homography::new(Matrix3::new(
            1.0, 0.02, 3.0, //
            -0.01, 1.0, 2.0, //
            2e-3, 1e-3, 1.0,
        ));
        let inv = h.inverse().unwrap();
        assert_relative_eq!(h.h * inv.h, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(inv.h * h.h, Matrix3::identity(), epsilon = 1e-12);
        // h33 of the inverse is not forced to one
        assert!((inv.h[(2, 2)] - 1.0).abs() > 1e-3);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let h = Homography::new(Matrix3::zeros());
        assert!(h.inverse().is_none());
    }

    #[test]
    fn points_behind_the_camera_do_not_map() {
        let h = Homography::new(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 1.0));
        assert!(h.transform_point(&Point2::new(2.0, 0.0)).is_none());
        assert!(h.transform_point(&Point2::new(0.5, 0.0)).is_some());
    }

    #[test]
    fn identity_check_is_scale_invariant() {
        let h = Homography::new(Matrix3::identity() * 3.0);
        assert!(h.is_identity(1e-12));
    }
}
