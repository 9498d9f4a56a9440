//! Single-marker pose estimation.
//!
//! The marker is a square of side `s` on the plane `Z = 0` of its own frame,
//! corners ordered TL, TR, BR, BL with the marker's +Y pointing "up". The
//! solver undistorts the corners, decomposes the plane-to-image homography
//! into an initial pose and refines it with Levenberg-Marquardt on the pixel
//! reprojection error.

use crate::{homography_from_4pt, CalibrationParameters};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use lm_nalgebra::{self as lm, storage::Owned, U6, U8};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced while estimating a marker pose.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("marker size must be finite and > 0 (got {0})")]
    InvalidMarkerSize(f64),
    #[error("camera intrinsics are not usable")]
    InvalidIntrinsics,
    #[error("failed to undistort marker corner {0}")]
    Undistort(usize),
    #[error("degenerate marker corners: {0}")]
    DegenerateHomography(&'static str),
    #[error("pose estimate is not finite")]
    NonFinite,
}

/// Rodrigues rotation vector plus translation, mapping marker coordinates into
/// the camera frame: `p_cam = R(rvec) * p_marker + tvec`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseVectors {
    pub rvec: [f64; 3],
    pub tvec: [f64; 3],
}

impl PoseVectors {
    pub fn new(rvec: [f64; 3], tvec: [f64; 3]) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_parts(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        Self {
            rvec: rotation.scaled_axis().into(),
            tvec: (*translation).into(),
        }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(Vector3::from(self.rvec))
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::from(self.tvec)
    }

    /// Marker-frame point to camera frame.
    pub fn transform(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation() * p.coords + self.translation()
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }
}

/// Object points of a square marker of side `size`, centred on the origin.
pub fn marker_object_points(size: f64) -> [Point3<f64>; 4] {
    let h = size * 0.5;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Estimate the pose of one square marker from its four pixel corners.
///
/// `corners` must follow the TL, TR, BR, BL order of [`marker_object_points`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(corners, calibration), fields(size = marker_size))
)]
pub fn estimate_marker_pose(
    corners: &[Point2<f64>; 4],
    marker_size: f64,
    calibration: &CalibrationParameters,
) -> Result<PoseVectors, PoseError> {
    if !marker_size.is_finite() || marker_size <= 0.0 {
        return Err(PoseError::InvalidMarkerSize(marker_size));
    }
    if !calibration.intrinsics().is_valid() {
        return Err(PoseError::InvalidIntrinsics);
    }

    let mut normalized = [Point2::origin(); 4];
    for (i, c) in corners.iter().enumerate() {
        normalized[i] = calibration
            .undistort_to_normalized(*c)
            .ok_or(PoseError::Undistort(i))?;
    }

    let object = marker_object_points(marker_size);
    let plane = object.map(|p| Point2::new(p.x, p.y));
    let h = homography_from_4pt(&plane, &normalized)
        .ok_or(PoseError::DegenerateHomography("homography solve failed"))?;

    let initial = pose_from_normalized_homography(&h.h)?;
    let refined = refine_pose(initial, &object, corners, calibration);
    if !refined.is_finite() {
        return Err(PoseError::NonFinite);
    }
    log::trace!(
        "marker pose: rvec={:?} tvec={:?} rmse={:?}",
        refined.rvec,
        refined.tvec,
        reprojection_rmse(&object, corners, &refined, calibration)
    );
    Ok(refined)
}

/// Batch form of [`estimate_marker_pose`]: one result per `(corners, size)` pair.
pub fn estimate_marker_poses(
    markers: &[([Point2<f64>; 4], f64)],
    calibration: &CalibrationParameters,
) -> Vec<Result<PoseVectors, PoseError>> {
    markers
        .iter()
        .map(|(corners, size)| estimate_marker_pose(corners, *size, calibration))
        .collect()
}

/// Project marker-frame points through `pose` and the camera model.
///
/// Returns `None` if any point lands behind the camera.
pub fn project_points(
    object: &[Point3<f64>],
    pose: &PoseVectors,
    calibration: &CalibrationParameters,
) -> Option<Vec<Point2<f64>>> {
    let rot = pose.rotation();
    let t = pose.translation();
    object
        .iter()
        .map(|p| calibration.project(&(rot * p.coords + t)))
        .collect()
}

/// Root-mean-square pixel reprojection error.
pub fn reprojection_rmse(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    pose: &PoseVectors,
    calibration: &CalibrationParameters,
) -> Option<f64> {
    if object.len() != image.len() || object.is_empty() {
        return None;
    }
    let projected = project_points(object, pose, calibration)?;
    let sum: f64 = projected
        .iter()
        .zip(image)
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    Some((sum / object.len() as f64).sqrt())
}

/// Decompose `H ~ [r1 r2 t]` (plane to normalised image) into a pose.
///
/// The rotation is projected onto SO(3); the translation is scaled so the first
/// two rotation columns have unit norm on average, and flipped to positive depth.
fn pose_from_normalized_homography(h: &Matrix3<f64>) -> Result<PoseVectors, PoseError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let denom = 0.5 * (h1.norm() + h2.norm());
    if denom <= 1e-12 || !denom.is_finite() {
        return Err(PoseError::DegenerateHomography("zero-scale homography"));
    }
    let lambda = 1.0 / denom;

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t = h3 * lambda;
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(PoseError::DegenerateHomography("rotation columns are parallel"));
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PoseError::DegenerateHomography("svd failed"));
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r_orth = u * v_t;
    }

    let pose = PoseVectors::from_parts(&Rotation3::from_matrix_unchecked(r_orth), &t);
    if pose.is_finite() {
        Ok(pose)
    } else {
        Err(PoseError::NonFinite)
    }
}

type Params = SVector<f64, 6>;
type Residuals = SVector<f64, 8>;

fn to_params(pose: &PoseVectors) -> Params {
    let [a, b, c] = pose.rvec;
    let [x, y, z] = pose.tvec;
    Params::from_column_slice(&[a, b, c, x, y, z])
}

fn to_pose(p: &Params) -> PoseVectors {
    PoseVectors::new([p[0], p[1], p[2]], [p[3], p[4], p[5]])
}

fn residuals(
    p: &Params,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
    calibration: &CalibrationParameters,
) -> Option<Residuals> {
    let pose = to_pose(p);
    let rot = pose.rotation();
    let t = pose.translation();
    let mut r = Residuals::zeros();
    for (i, (obj, img)) in object.iter().zip(image).enumerate() {
        let px = calibration.project(&(rot * obj.coords + t))?;
        r[2 * i] = px.x - img.x;
        r[2 * i + 1] = px.y - img.y;
    }
    Some(r)
}

/// Pixel reprojection of the four marker corners as a least-squares problem
/// over `[rvec, tvec]`.
struct MarkerPoseProblem<'a> {
    object: &'a [Point3<f64>; 4],
    image: &'a [Point2<f64>; 4],
    calibration: &'a CalibrationParameters,
    params: Params,
}

impl MarkerPoseProblem<'_> {
    fn residuals_at(&self, p: &Params) -> Option<Residuals> {
        residuals(p, self.object, self.image, self.calibration)
    }

    fn cost(&self) -> Option<f64> {
        self.residuals_at(&self.params).map(|r| r.norm_squared())
    }
}

impl LeastSquaresProblem<f64, U8, U6> for MarkerPoseProblem<'_> {
    type ResidualStorage = Owned<f64, U8>;
    type JacobianStorage = Owned<f64, U8, U6>;
    type ParameterStorage = Owned<f64, U6>;

    fn set_params(&mut self, x: &lm::Vector6<f64>) {
        self.params = Params::from_column_slice(x.as_slice());
    }

    fn params(&self) -> lm::Vector6<f64> {
        lm::Vector6::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<lm::SVector<f64, 8>> {
        let r = self.residuals_at(&self.params)?;
        Some(lm::SVector::from_column_slice(r.as_slice()))
    }

    // Forward differences; the distortion model makes the analytic form long.
    fn jacobian(&self) -> Option<lm::SMatrix<f64, 8, 6>> {
        let r = self.residuals_at(&self.params)?;
        let mut j = lm::SMatrix::<f64, 8, 6>::zeros();
        for k in 0..6 {
            let step = 1e-7 * self.params[k].abs().max(1.0);
            let mut pk = self.params;
            pk[k] += step;
            let col = (self.residuals_at(&pk)? - r) / step;
            for i in 0..8 {
                j[(i, k)] = col[i];
            }
        }
        Some(j)
    }
}

/// Refine `initial` with Levenberg-Marquardt.
///
/// Falls back to `initial` when the solver ends on a pose that is worse or
/// cannot be evaluated.
fn refine_pose(
    initial: PoseVectors,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
    calibration: &CalibrationParameters,
) -> PoseVectors {
    let problem = MarkerPoseProblem {
        object,
        image,
        calibration,
        params: to_params(&initial),
    };
    let Some(initial_cost) = problem.cost() else {
        return initial;
    };

    let (problem, report) = LevenbergMarquardt::new().minimize(problem);
    if !report.termination.was_successful() {
        log::trace!("pose refinement stopped: {:?}", report.termination);
    }
    match problem.cost() {
        Some(cost) if cost <= initial_cost => to_pose(&problem.params),
        _ => initial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CameraIntrinsics;
    use std::f64::consts::PI;

    fn calibration(distortion: &[f64]) -> CalibrationParameters {
        CalibrationParameters::new(
            CameraIntrinsics {
                fx: 900.0,
                fy: 880.0,
                cx: 640.0,
                cy: 360.0,
            },
            distortion,
            (1280, 720),
        )
    }

    fn ground_truth() -> PoseVectors {
        // Facing the camera (marker +Y up maps to image -y), slightly tilted.
        let rot = Rotation3::from_euler_angles(PI + 0.2, -0.15, 0.1);
        PoseVectors::from_parts(&rot, &Vector3::new(40.0, -25.0, 650.0))
    }

    fn rotation_angle_between(a: &PoseVectors, b: &PoseVectors) -> f64 {
        (a.rotation().inverse() * b.rotation()).angle()
    }

    fn corners_for(pose: &PoseVectors, size: f64, calib: &CalibrationParameters) -> [Point2<f64>; 4] {
        let pts = project_points(&marker_object_points(size), pose, calib).expect("visible");
        [pts[0], pts[1], pts[2], pts[3]]
    }

    #[test]
    fn recovers_exact_pose_without_distortion() {
        let calib = calibration(&[]);
        let gt = ground_truth();
        let corners = corners_for(&gt, 100.0, &calib);

        let est = estimate_marker_pose(&corners, 100.0, &calib).expect("pose");
        assert!((est.translation() - gt.translation()).norm() < 1e-6);
        assert!(rotation_angle_between(&est, &gt) < 1e-8);
    }

    #[test]
    fn recovers_pose_through_lens_distortion() {
        let calib = calibration(&[-0.2, 0.05, 0.001, -0.002, 0.0]);
        let gt = ground_truth();
        let corners = corners_for(&gt, 100.0, &calib);

        let est = estimate_marker_pose(&corners, 100.0, &calib).expect("pose");
        assert!((est.translation() - gt.translation()).norm() < 1e-4);
        assert!(rotation_angle_between(&est, &gt) < 1e-6);
        let rmse = reprojection_rmse(&marker_object_points(100.0), &corners, &est, &calib)
            .expect("rmse");
        assert!(rmse < 1e-6, "rmse {rmse}");
    }

    #[test]
    fn noisy_corners_stay_close() {
        let calib = calibration(&[]);
        let gt = ground_truth();
        let mut corners = corners_for(&gt, 100.0, &calib);
        let noise = [(0.3, -0.2), (-0.25, 0.1), (0.2, 0.3), (-0.1, -0.3)];
        for (c, (dx, dy)) in corners.iter_mut().zip(noise) {
            c.x += dx;
            c.y += dy;
        }

        let est = estimate_marker_pose(&corners, 100.0, &calib).expect("pose");
        let rel = (est.translation() - gt.translation()).norm() / gt.translation().norm();
        assert!(rel < 0.02, "relative translation error {rel}");
        assert!(est.tvec[2] > 0.0);
    }

    #[test]
    fn refinement_pulls_perturbed_pose_back() {
        let calib = calibration(&[-0.2, 0.05, 0.001, -0.002, 0.0]);
        let gt = ground_truth();
        let object = marker_object_points(100.0);
        let corners = corners_for(&gt, 100.0, &calib);

        let mut start = gt;
        start.rvec[0] += 0.03;
        start.rvec[2] -= 0.02;
        start.tvec[0] += 6.0;
        start.tvec[2] -= 15.0;
        let refined = refine_pose(start, &object, &corners, &calib);

        assert!((refined.translation() - gt.translation()).norm() < 1e-3);
        assert!(rotation_angle_between(&refined, &gt) < 1e-6);
    }

    #[test]
    fn translation_scales_with_marker_size() {
        let calib = calibration(&[]);
        let corners = corners_for(&ground_truth(), 100.0, &calib);
        let small = estimate_marker_pose(&corners, 100.0, &calib).expect("pose");
        let large = estimate_marker_pose(&corners, 200.0, &calib).expect("pose");
        assert!((large.translation() - small.translation() * 2.0).norm() < 1e-5);
    }

    #[test]
    fn rejects_bad_inputs() {
        let calib = calibration(&[]);
        let corners = corners_for(&ground_truth(), 100.0, &calib);
        assert_eq!(
            estimate_marker_pose(&corners, 0.0, &calib),
            Err(PoseError::InvalidMarkerSize(0.0))
        );

        let collinear = [
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 20.0),
            Point2::new(30.0, 30.0),
            Point2::new(40.0, 40.0),
        ];
        assert!(matches!(
            estimate_marker_pose(&collinear, 100.0, &calib),
            Err(PoseError::DegenerateHomography(_))
        ));
    }

    #[test]
    fn batch_reports_each_marker() {
        let calib = calibration(&[]);
        let corners = corners_for(&ground_truth(), 100.0, &calib);
        let results = estimate_marker_poses(&[(corners, 100.0), (corners, -1.0)], &calib);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
