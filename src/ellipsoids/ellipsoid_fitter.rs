use nalgebra::{Matrix3, Point3, Vector3};
use parry3d_f64::transformation::convex_hull;
use serde::{Serialize, Deserialize};
use crate::ellipsoids::ellipsoid::{Ellipsoid, EllipsoidDescriptor};
use crate::optimization::{NonlinearOptimizer, OptimizationProblem, OptimizerParameters, SolveStatus};
use crate::problem_functions::robotics_functions::EllipsoidContainment;
use crate::problem_functions::standard_functions::Product;
use crate::robot_modules::robot_library::RobotLibrary;
use crate::utils::utils_console::{trajopt_print, PrintColor, PrintMode, TrajoptDebug};
use crate::utils::utils_errors::TrajoptError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidFitConfig {
    /// Lower bound on every radius.
    pub min_radius: f64,
    /// Fit against the vertices of the convex hull instead of the full cloud.
    pub use_convex_hull: bool,
    /// Inflate the solver's answer until every point is inside.
    pub certify: bool,
    pub optimizer_parameters: OptimizerParameters,
    pub debug: TrajoptDebug
}
impl Default for EllipsoidFitConfig {
    fn default() -> Self {
        Self {
            min_radius: 1e-3,
            use_convex_hull: true,
            certify: true,
            optimizer_parameters: OptimizerParameters::default(),
            debug: TrajoptDebug::False
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidFitResult {
    ellipsoid: Ellipsoid,
    status: SolveStatus,
    max_quadratic_form: f64,
    num_points_used: usize,
    inflated: bool,
    sphere_fallback: bool
}
impl EllipsoidFitResult {
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
    pub fn status(&self) -> SolveStatus {
        self.status
    }
    /// Largest `(v - c)ᵀ A (v - c)` over the input cloud.
    pub fn max_quadratic_form(&self) -> f64 {
        self.max_quadratic_form
    }
    /// Number of points handed to the solver after the optional hull reduction.
    pub fn num_points_used(&self) -> usize {
        self.num_points_used
    }
    pub fn inflated(&self) -> bool {
        self.inflated
    }
    pub fn sphere_fallback(&self) -> bool {
        self.sphere_fallback
    }
    pub fn print_summary(&self) {
        let color = if self.status == SolveStatus::Converged { PrintColor::Green } else { PrintColor::Yellow };
        trajopt_print(&format!("Ellipsoid fit ({:?}) on {} points", self.status, self.num_points_used), PrintMode::Println, color, true);
        trajopt_print(&format!("   w = {:.5?}", self.ellipsoid.rotation_vector().as_slice()), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   c = {:.5?}", self.ellipsoid.center().as_slice()), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   r = {:.5?}", self.ellipsoid.radii().as_slice()), PrintMode::Println, PrintColor::None, false);
        trajopt_print(&format!("   volume {:.6e}, max quadratic form {:.6}, inflated {}, sphere fallback {}", self.ellipsoid.volume(), self.max_quadratic_form, self.inflated, self.sphere_fallback), PrintMode::Println, PrintColor::None, false);
    }
}

/// Minimum-volume enclosing ellipsoid of a point cloud:
///
/// minimize `r₀ r₁ r₂` over `(w, c, r)` subject to `(v - c)ᵀ A (v - c) ≤ 1` for every point `v`,
/// `A = R diag(1/r²) Rᵀ`, `R = exp(w)` and `r ≥ min_radius`.
///
/// The solve runs in the cloud's principal axes, each scaled by the cloud's extent along it, and
/// starts from the smallest sphere about the centroid that holds every point.  The fitted
/// ellipsoid is mapped back through the same affine change of coordinates, which scales every
/// volume by the same factor and so keeps the minimizer.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use trajopt::ellipsoids::ellipsoid_fitter::{EllipsoidFitConfig, EllipsoidFitter};
///
/// let points = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0),
///                   Vector3::new(0.0, 0.5, 0.0), Vector3::new(0.0, -0.5, 0.0),
///                   Vector3::new(0.0, 0.0, 0.2), Vector3::new(0.0, 0.0, -0.2)];
/// let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).expect("error");
/// assert!(points.iter().all(|p| fit.ellipsoid().contains(p, 1e-6)));
/// ```
pub struct EllipsoidFitter;

/// Axes thinner than this fraction of the longest one are widened to it before normalizing.
const FLAT_AXIS_FRACTION: f64 = 0.01;
/// Lower bound on the radii in normalized coordinates, where a non-degenerate cloud spans
/// `[-1, 1]` along every axis.
const MIN_NORMALIZED_RADIUS: f64 = 0.05;

impl EllipsoidFitter {
    pub fn fit(points: &[Vector3<f64>], config: &EllipsoidFitConfig) -> Result<EllipsoidFitResult, TrajoptError> {
        if points.is_empty() {
            return Err(TrajoptError::new_generic_error_str("cannot fit an ellipsoid to an empty point cloud.", file!(), line!()));
        }
        if points.iter().any(|p| p.iter().any(|x| !x.is_finite())) {
            return Err(TrajoptError::new_generic_error_str("point cloud contains non-finite coordinates.", file!(), line!()));
        }
        if !(config.min_radius > 0.0) {
            return Err(TrajoptError::new_generic_error_str(&format!("min_radius must be positive, got {}.", config.min_radius), file!(), line!()));
        }

        let centroid = Self::centroid(points);
        let bounding_radius = points.iter().map(|p| (p - centroid).norm()).fold(0.0, f64::max).max(config.min_radius);

        // principal axes of the cloud, each scaled by the cloud's extent along it
        let axes = Self::principal_axes(points, &centroid);
        let local: Vec<Vector3<f64>> = points.iter().map(|p| axes.transpose() * (p - centroid)).collect();
        let extents = local.iter().fold(Vector3::zeros(), |m: Vector3<f64>, l| m.zip_map(&l.abs(), f64::max));
        let extent_floor = (FLAT_AXIS_FRACTION * extents.max()).max(config.min_radius);
        let scale = extents.map(|e| e.max(extent_floor));
        let normalized: Vec<Vector3<f64>> = local.iter().map(|l| l.component_div(&scale)).collect();

        let reduced = if config.use_convex_hull { Self::hull_vertices(&normalized) } else { normalized.clone() };
        // smallest sphere about the centroid that holds every point
        let r0 = normalized.iter().map(|z| z.norm()).fold(1.0, f64::max);
        let min_radius = (config.min_radius / scale.max()).max(MIN_NORMALIZED_RADIUS).min(r0);

        let mut problem = OptimizationProblem::new();
        let w = problem.add_variable("w", 3);
        let c = problem.add_variable("c", 3);
        let r = problem.add_variable("r", 3);
        problem.set_bounds(&r, &[min_radius; 3], &[f64::INFINITY; 3])?;
        problem.set_initial_guess(&w, &[0.0; 3])?;
        problem.set_initial_guess(&c, &[0.0; 3])?;
        problem.set_initial_guess(&r, &[r0; 3])?;
        problem.add_cost(Box::new(Product::new(3)), &[&r], 1.0)?;
        problem.add_inequality_constraint(Box::new(EllipsoidContainment::new(reduced.clone())), &[&w, &c, &r])?;

        let optimizer = NonlinearOptimizer::new(config.optimizer_parameters.clone(), config.debug.clone());
        let result = optimizer.optimize(&problem, None)?;
        if let Some(d) = result.diagnostic() {
            trajopt_print(&format!("ERROR in convergence, returning the last iterate: {}", d), PrintMode::Println, PrintColor::Yellow, true);
        }

        let x = result.x_min().as_slice();
        let normalized_fit = match Ellipsoid::new_from_parameters(x) {
            Ok(e) => { e }
            Err(_) => {
                trajopt_print("ellipsoid iterate is not a valid ellipsoid, using the initial sphere.", PrintMode::Println, PrintColor::Yellow, true);
                Ellipsoid::new_sphere(Vector3::zeros(), r0)?
            }
        };
        // z = S⁻¹ Pᵀ (p - μ), so A = P S⁻¹ A_z S⁻¹ Pᵀ and c = μ + P S c_z
        let scale_inverse = Matrix3::from_diagonal(&scale.map(|s| 1.0 / s));
        let shape_matrix = axes * scale_inverse * normalized_fit.shape_matrix() * scale_inverse * axes.transpose();
        let center = centroid + axes * normalized_fit.center().component_mul(&scale);
        let mut ellipsoid = Ellipsoid::new_from_shape_matrix(center, &shape_matrix)?.with_min_radius(config.min_radius)?;

        let mut inflated = false;
        let mut sphere_fallback = false;
        if config.certify {
            if ellipsoid.max_quadratic_form(points) > 1.0 {
                ellipsoid = ellipsoid.inflated_to_contain(points)?;
                inflated = true;
            }
            let sphere = Ellipsoid::new_sphere(centroid, bounding_radius)?;
            if ellipsoid.volume() > sphere.volume() {
                ellipsoid = sphere;
                sphere_fallback = true;
            }
        }

        Ok(EllipsoidFitResult {
            max_quadratic_form: ellipsoid.max_quadratic_form(points),
            ellipsoid,
            status: result.status(),
            num_points_used: reduced.len(),
            inflated,
            sphere_fallback
        })
    }
    /// Fits one ellipsoid per link shape of a library robot, each in its joint's frame.
    pub fn fit_robot_links(robot_name: &str, num_surface_samples: usize, seed: u64, config: &EllipsoidFitConfig) -> Result<Vec<EllipsoidDescriptor>, TrajoptError> {
        let model = RobotLibrary::load(robot_name)?;
        let shapes = RobotLibrary::load_link_shapes(robot_name)?;
        let mut out = vec![];
        for (i, shape) in shapes.iter().enumerate() {
            let points = shape.sample_surface_points(num_surface_samples, seed + i as u64);
            let fit = Self::fit(&points, config)?;
            if let TrajoptDebug::True { .. } = config.debug { fit.print_summary(); }
            let joint_name = model.get_joint(shape.joint_idx())?.name().to_string();
            out.push(EllipsoidDescriptor::new(&format!("{}_{}", joint_name, i), shape.joint_idx(), fit.ellipsoid().clone()));
        }
        Ok(out)
    }
    fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
        let mut sum = Vector3::zeros();
        for p in points { sum += p; }
        sum / points.len() as f64
    }
    fn covariance(points: &[Vector3<f64>], centroid: &Vector3<f64>) -> Matrix3<f64> {
        let mut covariance = Matrix3::zeros();
        for p in points {
            let d = p - centroid;
            covariance += d * d.transpose();
        }
        covariance / points.len() as f64
    }
    /// Eigenvectors of the covariance as the columns of a proper rotation.
    fn principal_axes(points: &[Vector3<f64>], centroid: &Vector3<f64>) -> Matrix3<f64> {
        let mut axes = Self::covariance(points, centroid).symmetric_eigen().eigenvectors;
        if axes.determinant() < 0.0 {
            let flipped = -axes.column(2);
            axes.set_column(2, &flipped);
        }
        axes
    }
    /// Vertices of the convex hull, or the points themselves when the cloud is too small or too
    /// flat for a three dimensional hull.
    fn hull_vertices(points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        if points.len() < 5 { return points.to_vec(); }
        let centroid = Self::centroid(points);
        let smallest = Self::covariance(points, &centroid).symmetric_eigenvalues().min();
        if !(smallest > 1e-10) { return points.to_vec(); }

        let hull_input: Vec<Point3<f64>> = points.iter().map(|v| Point3::from(*v)).collect();
        let res = convex_hull(&hull_input);
        let vertices: Vec<Vector3<f64>> = res.0.iter().map(|p| p.coords).collect();
        if vertices.len() < 4 { return points.to_vec(); }
        vertices
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use crate::robot_modules::robot_library::LinkShape;
    use crate::utils::utils_files::{temp_file_path, SaveAndLoadable};
    use crate::utils::utils_se3::se3_pose::SE3Pose;
    use super::*;

    fn box_cloud(half_extents: Vector3<f64>, n: usize, seed: u64) -> Vec<Vector3<f64>> {
        LinkShape::new(0, SE3Pose::new_translation(0.3, -0.1, 0.2), half_extents).sample_surface_points(n, seed)
    }

    fn bounding_sphere(points: &[Vector3<f64>]) -> Ellipsoid {
        let centroid = EllipsoidFitter::centroid(points);
        let radius = points.iter().map(|p| (p - centroid).norm()).fold(0.0, f64::max);
        Ellipsoid::new_sphere(centroid, radius).unwrap()
    }

    fn sorted_radii(e: &Ellipsoid) -> Vec<f64> {
        let mut radii = e.radii().as_slice().to_vec();
        radii.sort_by(|a, b| a.partial_cmp(b).unwrap());
        radii
    }

    #[test]
    fn fitted_ellipsoid_contains_every_point() {
        let points = box_cloud(Vector3::new(0.1, 0.05, 0.4), 200, 3);
        let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
        for p in &points {
            assert!(fit.ellipsoid().quadratic_form(p) <= 1.0 + 1e-6);
        }
        assert_eq!(fit.status(), SolveStatus::Converged);
        assert!(!fit.sphere_fallback());
        assert!(fit.max_quadratic_form() <= 1.0 + 1e-6);
        assert!(fit.ellipsoid().volume() < 0.5 * bounding_sphere(&points).volume());
    }

    #[test]
    fn elongated_box_gets_its_enclosing_ellipsoid() {
        // the smallest ellipsoid around a box has radii sqrt(3) times its half extents
        let points = box_cloud(Vector3::new(0.02, 0.02, 0.5), 100, 7);
        let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
        assert_eq!(fit.status(), SolveStatus::Converged);
        assert!(!fit.sphere_fallback());
        assert!(points.iter().all(|p| fit.ellipsoid().contains(p, 1e-6)));
        assert!(fit.ellipsoid().volume() < 0.5 * bounding_sphere(&points).volume());
        let radii = sorted_radii(fit.ellipsoid());
        let s3 = 3.0_f64.sqrt();
        assert_abs_diff_eq!(radii[0], 0.02 * s3, epsilon = 5e-3);
        assert_abs_diff_eq!(radii[1], 0.02 * s3, epsilon = 5e-3);
        assert_abs_diff_eq!(radii[2], 0.5 * s3, epsilon = 2e-2);
        assert_abs_diff_eq!(*fit.ellipsoid().center(), Vector3::new(0.3, -0.1, 0.2), epsilon = 1e-2);
    }

    #[test]
    fn full_cloud_fit_matches_the_hull_fit() {
        let points = box_cloud(Vector3::new(0.02, 0.02, 0.5), 100, 7);
        let mut config = EllipsoidFitConfig::default();
        config.use_convex_hull = false;
        let full = EllipsoidFitter::fit(&points, &config).unwrap();
        assert_eq!(full.status(), SolveStatus::Converged);
        assert_eq!(full.num_points_used(), points.len());
        assert!(!full.sphere_fallback());
        assert!(points.iter().all(|p| full.ellipsoid().contains(p, 1e-6)));

        let hull = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
        assert_abs_diff_eq!(full.ellipsoid().volume(), hull.ellipsoid().volume(), epsilon = 0.05 * hull.ellipsoid().volume());
    }

    #[test]
    fn double_pendulum_links_fit_proper_ellipsoids() {
        for (i, shape) in RobotLibrary::load_link_shapes("double_pendulum").unwrap().iter().enumerate() {
            let points = shape.sample_surface_points(40, 1 + i as u64);
            let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
            assert_eq!(fit.status(), SolveStatus::Converged);
            assert!(!fit.sphere_fallback());
            assert!(fit.max_quadratic_form() <= 1.0 + 1e-9);
            assert!(fit.ellipsoid().volume() < 0.5 * bounding_sphere(&points).volume());
        }
    }

    #[test]
    fn convex_hull_reduces_interior_points() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut points = box_cloud(Vector3::new(0.2, 0.2, 0.2), 0, 0);
        for _ in 0..100 {
            points.push(Vector3::new(rng.gen_range(-0.1..0.1), rng.gen_range(-0.1..0.1), rng.gen_range(-0.1..0.1)) + Vector3::new(0.3, -0.1, 0.2));
        }
        let fit = EllipsoidFitter::fit(&points, &EllipsoidFitConfig::default()).unwrap();
        assert!(fit.num_points_used() < points.len());
        assert!(points.iter().all(|p| fit.ellipsoid().contains(p, 1e-6)));
    }

    #[test]
    fn flat_and_single_point_clouds_are_handled() {
        let square = vec![Vector3::new(1.0, 1.0, 0.0), Vector3::new(-1.0, 1.0, 0.0), Vector3::new(1.0, -1.0, 0.0), Vector3::new(-1.0, -1.0, 0.0), Vector3::new(0.5, 0.0, 0.0), Vector3::new(0.0, 0.5, 0.0)];
        let fit = EllipsoidFitter::fit(&square, &EllipsoidFitConfig::default()).unwrap();
        assert_eq!(fit.num_points_used(), square.len());
        assert!(square.iter().all(|p| fit.ellipsoid().contains(p, 1e-6)));

        let single = vec![Vector3::new(0.1, 0.2, 0.3)];
        let fit = EllipsoidFitter::fit(&single, &EllipsoidFitConfig::default()).unwrap();
        assert!(fit.ellipsoid().contains(&single[0], 1e-6));
        assert!(fit.ellipsoid().radii().iter().all(|r| *r > 0.0));
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(EllipsoidFitter::fit(&[], &EllipsoidFitConfig::default()).is_err());
        assert!(EllipsoidFitter::fit(&[Vector3::new(f64::NAN, 0.0, 0.0)], &EllipsoidFitConfig::default()).is_err());
        let mut config = EllipsoidFitConfig::default();
        config.min_radius = 0.0;
        assert!(EllipsoidFitter::fit(&[Vector3::zeros()], &config).is_err());
    }

    #[test]
    fn robot_link_table_round_trips_through_a_file() {
        let descriptors = EllipsoidFitter::fit_robot_links("double_pendulum", 40, 1, &EllipsoidFitConfig::default()).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[1].joint_idx(), 1);
        let path = temp_file_path("double_pendulum_ellipsoids.json");
        descriptors.save_to_path(&path).unwrap();
        let loaded = Vec::<EllipsoidDescriptor>::load_from_path(&path).unwrap();
        assert_eq!(descriptors, loaded);
        let shapes = RobotLibrary::load_link_shapes("double_pendulum").unwrap();
        for (d, shape) in descriptors.iter().zip(shapes.iter()) {
            let points = shape.sample_surface_points(40, 0);
            assert!(d.ellipsoid().volume() < 0.5 * bounding_sphere(&points).volume());
        }
        assert_abs_diff_eq!(loaded[0].ellipsoid().center()[2], descriptors[0].ellipsoid().center()[2]);
    }
}
