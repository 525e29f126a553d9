use std::f64::consts::PI;
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Serialize, Deserialize};
use crate::utils::utils_errors::TrajoptError;
use crate::utils::utils_se3::se3_pose::{SE3Pose, SE3Utils};

/// Number of scalar parameters of an ellipsoid: rotation vector, center, radii.
pub const ELLIPSOID_PARAMETER_DIM: usize = 9;

/// An ellipsoid `{p : (p - c)ᵀ A (p - c) ≤ 1}` with `A = R diag(1/r²) Rᵀ`, where the rotation
/// `R = exp(w)` is stored as its rotation vector `w`.  The radii are always positive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    rotation_vector: Vector3<f64>,
    center: Vector3<f64>,
    radii: Vector3<f64>
}
impl Ellipsoid {
    pub fn new(rotation_vector: Vector3<f64>, center: Vector3<f64>, radii: Vector3<f64>) -> Result<Self, TrajoptError> {
        if radii.iter().any(|r| !(*r > 0.0) || !r.is_finite()) {
            return Err(TrajoptError::new_generic_error_str(&format!("ellipsoid radii must be positive and finite, got {:?}.", radii.as_slice()), file!(), line!()));
        }
        Ok(Self { rotation_vector, center, radii })
    }
    pub fn new_sphere(center: Vector3<f64>, radius: f64) -> Result<Self, TrajoptError> {
        Self::new(Vector3::zeros(), center, Vector3::new(radius, radius, radius))
    }
    /// Builds from the parameter layout `[w (3), c (3), r (3)]` used by the fitter.
    pub fn new_from_parameters(parameters: &[f64]) -> Result<Self, TrajoptError> {
        if parameters.len() != ELLIPSOID_PARAMETER_DIM {
            return Err(TrajoptError::new_dimension_mismatch_error("ellipsoid parameters", ELLIPSOID_PARAMETER_DIM, parameters.len(), file!(), line!()));
        }
        Self::new(Vector3::new(parameters[0], parameters[1], parameters[2]),
                  Vector3::new(parameters[3], parameters[4], parameters[5]),
                  Vector3::new(parameters[6], parameters[7], parameters[8]))
    }
    /// Recovers the principal frame and radii of `{p : (p - c)ᵀ A (p - c) ≤ 1}` from a symmetric
    /// positive definite `A`.
    pub fn new_from_shape_matrix(center: Vector3<f64>, shape_matrix: &Matrix3<f64>) -> Result<Self, TrajoptError> {
        let symmetric = (shape_matrix + shape_matrix.transpose()) * 0.5;
        let eigen = symmetric.symmetric_eigen();
        if eigen.eigenvalues.iter().any(|l| !(*l > 0.0) || !l.is_finite()) {
            return Err(TrajoptError::new_generic_error_str(&format!("shape matrix must be positive definite, got eigenvalues {:?}.", eigen.eigenvalues.as_slice()), file!(), line!()));
        }
        let mut axes = eigen.eigenvectors;
        if axes.determinant() < 0.0 {
            let flipped = -axes.column(2);
            axes.set_column(2, &flipped);
        }
        let radii = eigen.eigenvalues.map(|l| 1.0 / l.sqrt());
        let rotation = Rotation3::from_matrix_unchecked(axes);
        Self::new(SE3Utils::log3(&rotation), center, radii)
    }
    /// Same ellipsoid with every radius raised to at least `min_radius`.
    pub fn with_min_radius(&self, min_radius: f64) -> Result<Self, TrajoptError> {
        Self::new(self.rotation_vector, self.center, self.radii.map(|r| r.max(min_radius)))
    }
    pub fn to_parameters(&self) -> Vec<f64> {
        let mut out = self.rotation_vector.as_slice().to_vec();
        out.extend_from_slice(self.center.as_slice());
        out.extend_from_slice(self.radii.as_slice());
        out
    }
    pub fn rotation_vector(&self) -> &Vector3<f64> {
        &self.rotation_vector
    }
    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }
    pub fn radii(&self) -> &Vector3<f64> {
        &self.radii
    }
    pub fn rotation(&self) -> Rotation3<f64> {
        SE3Utils::exp3(&self.rotation_vector)
    }
    /// The pose of the ellipsoid's principal frame.
    pub fn pose(&self) -> SE3Pose {
        SE3Pose::new_from_rotation_and_translation(&self.rotation(), &self.center)
    }
    pub fn shape_matrix(&self) -> Matrix3<f64> {
        Self::shape_matrix_from_parameters(&self.rotation_vector, &self.radii)
    }
    pub fn shape_matrix_from_parameters(rotation_vector: &Vector3<f64>, radii: &Vector3<f64>) -> Matrix3<f64> {
        let r = SE3Utils::exp3(rotation_vector).into_inner();
        let d = Matrix3::from_diagonal(&Vector3::new(1.0 / (radii[0] * radii[0]), 1.0 / (radii[1] * radii[1]), 1.0 / (radii[2] * radii[2])));
        r * d * r.transpose()
    }
    /// `(p - c)ᵀ A (p - c)`: at most one inside or on the ellipsoid, more than one outside.
    pub fn quadratic_form(&self, point: &Vector3<f64>) -> f64 {
        let d = point - self.center;
        (d.transpose() * self.shape_matrix() * d)[(0, 0)]
    }
    pub fn contains(&self, point: &Vector3<f64>, tolerance: f64) -> bool {
        self.quadratic_form(point) <= 1.0 + tolerance
    }
    pub fn max_quadratic_form(&self, points: &[Vector3<f64>]) -> f64 {
        points.iter().map(|p| self.quadratic_form(p)).fold(f64::NEG_INFINITY, f64::max)
    }
    pub fn volume(&self) -> f64 {
        4.0 / 3.0 * PI * self.radii[0] * self.radii[1] * self.radii[2]
    }
    /// Same ellipsoid with every radius multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self, TrajoptError> {
        Self::new(self.rotation_vector, self.center, self.radii * factor)
    }
    /// Smallest uniform inflation of this ellipsoid that contains every point.
    pub fn inflated_to_contain(&self, points: &[Vector3<f64>]) -> Result<Self, TrajoptError> {
        let m = self.max_quadratic_form(points);
        if m <= 1.0 { return Ok(self.clone()); }
        self.scaled(m.sqrt())
    }
    /// The ellipsoid expressed in the parent frame of `pose`, where it was given in `pose`'s local frame.
    pub fn transformed(&self, pose: &SE3Pose) -> Result<Self, TrajoptError> {
        let center = pose.act_point(&self.center);
        let rotation = Rotation3::from_matrix_unchecked(pose.rotation_matrix() * self.rotation().into_inner());
        Self::new(SE3Utils::log3(&rotation), center, self.radii)
    }
}

/// An ellipsoid rigidly attached to a joint body, expressed in the joint frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidDescriptor {
    name: String,
    joint_idx: usize,
    ellipsoid: Ellipsoid
}
impl EllipsoidDescriptor {
    pub fn new(name: &str, joint_idx: usize, ellipsoid: Ellipsoid) -> Self {
        Self { name: name.to_string(), joint_idx, ellipsoid }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn joint_idx(&self) -> usize {
        self.joint_idx
    }
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn axis_aligned_quadratic_form() {
        let e = Ellipsoid::new(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 1.0, 0.5)).unwrap();
        assert_abs_diff_eq!(e.quadratic_form(&Vector3::new(3.0, 0.0, 0.0)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.quadratic_form(&Vector3::new(1.0, 0.0, 0.5)), 1.0, epsilon = 1e-12);
        assert!(e.contains(&Vector3::new(1.0, 0.5, 0.0), 0.0));
        assert!(e.quadratic_form(&Vector3::new(1.0, 2.0, 0.0)) >= 1.0);
    }

    #[test]
    fn rotation_moves_the_long_axis() {
        let e = Ellipsoid::new(Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2), Vector3::zeros(), Vector3::new(2.0, 1.0, 1.0)).unwrap();
        // the long x axis is rotated onto y
        assert_abs_diff_eq!(e.quadratic_form(&Vector3::new(0.0, 2.0, 0.0)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.quadratic_form(&Vector3::new(2.0, 0.0, 0.0)), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn inflation_contains_all_points() {
        let e = Ellipsoid::new_sphere(Vector3::zeros(), 1.0).unwrap();
        let points = vec![Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 0.5, 0.0)];
        let big = e.inflated_to_contain(&points).unwrap();
        for p in &points { assert!(big.contains(p, 1e-12)); }
        assert_abs_diff_eq!(big.radii()[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn non_positive_radii_are_rejected() {
        assert!(Ellipsoid::new(Vector3::zeros(), Vector3::zeros(), Vector3::new(1.0, 0.0, 1.0)).is_err());
        assert!(Ellipsoid::new_from_parameters(&[0.0; 8]).is_err());
    }

    #[test]
    fn shape_matrix_decomposition_recovers_the_ellipsoid() {
        let e = Ellipsoid::new(Vector3::new(0.4, -0.3, 0.7), Vector3::new(1.0, 0.5, -0.2), Vector3::new(0.9, 0.3, 0.1)).unwrap();
        let recovered = Ellipsoid::new_from_shape_matrix(*e.center(), &e.shape_matrix()).unwrap();
        assert_abs_diff_eq!(recovered.shape_matrix(), e.shape_matrix(), epsilon = 1e-9);
        assert_abs_diff_eq!(recovered.volume(), e.volume(), epsilon = 1e-12);
        assert!(Ellipsoid::new_from_shape_matrix(Vector3::zeros(), &Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 1.0))).is_err());
    }

    #[test]
    fn raising_the_radii_keeps_contained_points() {
        let e = Ellipsoid::new(Vector3::new(0.1, 0.2, 0.3), Vector3::zeros(), Vector3::new(1.0, 0.01, 0.5)).unwrap();
        let p = Vector3::new(0.3, 0.0, 0.2);
        let raised = e.with_min_radius(0.05).unwrap();
        assert_abs_diff_eq!(raised.radii()[1], 0.05, epsilon = 1e-15);
        assert!(raised.quadratic_form(&p) <= e.quadratic_form(&p) + 1e-12);
    }

    #[test]
    fn transform_keeps_membership() {
        let e = Ellipsoid::new(Vector3::new(0.2, -0.1, 0.4), Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.5, 0.3, 0.2)).unwrap();
        let pose = SE3Pose::new_from_euler_angles(0.3, 0.5, -0.2, 1.0, 2.0, 3.0);
        let moved = e.transformed(&pose).unwrap();
        let p = Vector3::new(0.3, 0.1, 0.25);
        assert_abs_diff_eq!(e.quadratic_form(&p), moved.quadratic_form(&pose.act_point(&p)), epsilon = 1e-9);
    }
}
