use crate::CameraError;
use zoloto_aruco::RenderError;
use zoloto_core::{CalibrationError, PoseError};

/// Errors produced by the high-level marker and camera API.
#[derive(thiserror::Error, Debug)]
pub enum ZolotoError {
    /// A pose was requested from a marker without camera calibration.
    #[error("marker pose requires camera calibration parameters")]
    MissingCalibrations,

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("unknown marker type {0:?}")]
    UnknownMarkerType(String),
}
