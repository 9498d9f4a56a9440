//! Camera intrinsics, lens distortion and calibration files.

use nalgebra::{Matrix2, Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Errors while loading or validating calibration parameters.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid calibration: {0}")]
    Invalid(String),
}

/// Pinhole camera intrinsics (pixels).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when every value is finite and focal lengths are non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn pixel_to_normalized(self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    pub fn normalized_to_pixel(self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * p.x + self.cx, self.fy * p.y + self.cy)
    }

    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Brown-Conrady radial-tangential distortion, OpenCV coefficient order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

/// Largest accepted `|distort(u) - p|` in normalised units.
const UNDISTORT_RESIDUAL_TOL: f64 = 1e-9;

/// Undistortion iteration settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    pub max_iters: usize,
    /// Stop once the update norm falls below this.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

impl BrownConrady {
    /// `[k1, k2, p1, p2, k3]`; shorter slices are zero-padded.
    pub fn from_coefficients(coeffs: &[f64]) -> Self {
        let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: c(0),
            k2: c(1),
            p1: c(2),
            p2: c(3),
            k3: c(4),
        }
    }

    pub fn is_zero(&self) -> bool {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
            .iter()
            .all(|v| *v == 0.0)
    }

    pub fn distort_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Jacobian of [`Self::distort_normalized`] at `p`.
    fn distortion_jacobian(&self, p: Point2<f64>) -> Matrix2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let g = self.k1 + r2 * (2.0 * self.k2 + 3.0 * r2 * self.k3);
        let cross = 2.0 * x * y * g + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        Matrix2::new(
            radial + 2.0 * x * x * g + 2.0 * self.p1 * y + 6.0 * self.p2 * x,
            cross,
            cross,
            radial + 2.0 * y * y * g + 6.0 * self.p1 * y + 2.0 * self.p2 * x,
        )
    }

    /// Invert [`Self::distort_normalized`].
    ///
    /// Fixed-point iteration first, then Newton steps if that has not
    /// converged. Returns `None` when neither reaches the target.
    pub fn undistort_normalized(&self, p: Point2<f64>, cfg: UndistortConfig) -> Option<Point2<f64>> {
        if self.is_zero() {
            return Some(p);
        }
        let iters = cfg.max_iters.max(1);
        let (mut x, mut y) = (p.x, p.y);
        for _ in 0..iters {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let nx = (p.x - dx) / radial;
            let ny = (p.y - dy) / radial;
            if !nx.is_finite() || !ny.is_finite() {
                return None;
            }
            let step = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
            x = nx;
            y = ny;
            if step <= cfg.eps {
                return Some(Point2::new(x, y));
            }
        }

        let mut u = Vector2::new(x, y);
        for _ in 0..iters {
            let r = self.distort_normalized(Point2::from(u)).coords - p.coords;
            if r.norm() <= UNDISTORT_RESIDUAL_TOL {
                return Some(Point2::from(u));
            }
            let delta = self.distortion_jacobian(Point2::from(u)).try_inverse()? * r;
            u -= delta;
            if !u.x.is_finite() || !u.y.is_finite() {
                return None;
            }
        }
        let residual = (self.distort_normalized(Point2::from(u)).coords - p.coords).norm();
        if residual <= UNDISTORT_RESIDUAL_TOL {
            return Some(Point2::from(u));
        }
        log::debug!(
            "undistortion of ({:.6}, {:.6}) did not converge, residual {residual:.3e}",
            p.x,
            p.y
        );
        None
    }
}

/// Calibration of one camera: intrinsic matrix, distortion and the resolution
/// it was calibrated at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationParameters {
    /// Row-major 3x3 intrinsic matrix.
    #[serde(alias = "cameraMatrix")]
    pub camera_matrix: [[f64; 3]; 3],
    /// OpenCV order `k1, k2, p1, p2[, k3]`.
    #[serde(alias = "dist_coeffs", alias = "distCoeffs", default)]
    pub distance_coefficients: Vec<f64>,
    /// `(width, height)` in pixels.
    #[serde(alias = "cameraResolution")]
    pub resolution: (u32, u32),
}

impl CalibrationParameters {
    pub fn new(intrinsics: CameraIntrinsics, distortion: &[f64], resolution: (u32, u32)) -> Self {
        Self {
            camera_matrix: [
                [intrinsics.fx, 0.0, intrinsics.cx],
                [0.0, intrinsics.fy, intrinsics.cy],
                [0.0, 0.0, 1.0],
            ],
            distance_coefficients: distortion.to_vec(),
            resolution,
        }
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        let k = &self.camera_matrix;
        CameraIntrinsics {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        }
    }

    pub fn distortion(&self) -> BrownConrady {
        BrownConrady::from_coefficients(&self.distance_coefficients)
    }

    /// Check that the parameters describe a usable pinhole camera.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !self.intrinsics().is_valid() {
            return Err(CalibrationError::Invalid(
                "focal lengths must be finite and non-zero".into(),
            ));
        }
        let k = &self.camera_matrix;
        if k[0][1].abs() > 1e-9 || k[1][0].abs() > 1e-9 || k[2] != [0.0, 0.0, 1.0] {
            return Err(CalibrationError::Invalid(
                "camera matrix must be [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]".into(),
            ));
        }
        if self.distance_coefficients.len() > 5 {
            return Err(CalibrationError::Invalid(format!(
                "expected at most 5 distortion coefficients, got {}",
                self.distance_coefficients.len()
            )));
        }
        if self.distance_coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CalibrationError::Invalid(
                "distortion coefficients must be finite".into(),
            ));
        }
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err(CalibrationError::Invalid("resolution must be non-zero".into()));
        }
        Ok(())
    }

    /// Project a camera-frame point into distorted pixel coordinates.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 1e-12 {
            return None;
        }
        let n = Point2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let d = self.distortion().distort_normalized(n);
        let px = self.intrinsics().normalized_to_pixel(d);
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }

    /// Distorted pixel to undistorted normalised coordinates.
    pub fn undistort_to_normalized(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let n = self.intrinsics().pixel_to_normalized(p);
        self.distortion()
            .undistort_normalized(n, UndistortConfig::default())
    }

    /// Distorted pixel to undistorted pixel.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let n = self.undistort_to_normalized(p)?;
        Some(self.intrinsics().normalized_to_pixel(n))
    }

    /// Load calibration parameters from JSON.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let raw = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Write these parameters to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Read and validate a calibration file.
pub fn parse_calibration_file(path: impl AsRef<Path>) -> Result<CalibrationParameters, CalibrationError> {
    let path = path.as_ref();
    let params = CalibrationParameters::load_json(path)?;
    log::debug!(
        "loaded calibration from {} ({}x{})",
        path.display(),
        params.resolution.0,
        params.resolution.1
    );
    Ok(params)
}
