//! Fiducial marker toolkit.
//!
//! This crate provides:
//! - [`Marker`] / [`EagerMarker`]: detected markers whose pose (rotation and
//!   translation vectors) is computed on first use or up front,
//! - camera wrappers ([`Camera`], [`SnapshotCamera`], [`ImageFileCamera`]) over a
//!   pluggable [`CaptureBackend`], with [`find_camera_ids`] for enumeration,
//! - JSON camera configuration and frame annotation.
//!
//! ## Quickstart
//!
//! ```no_run
//! use zoloto::{BaseCamera, BaseMarker, ImageFileCamera, MarkerProcessor, MarkerSize, MarkerType};
//! use zoloto::core::parse_calibration_file;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let calibration = parse_calibration_file("calibration.json")?;
//! let processor = MarkerProcessor::new(MarkerType::Dict4x4_50, MarkerSize::Fixed(100), Some(calibration));
//! let mut camera = ImageFileCamera::new("frame.png", processor);
//! for marker in camera.process_frame()? {
//!     println!("marker {} is {} mm away", marker.id(), marker.distance()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `zoloto::core`: geometry, calibration, pose estimation, logging.
//! - `zoloto::aruco`: dictionaries, detector and marker rendering.

pub use zoloto_aruco as aruco;
pub use zoloto_core as core;

pub mod annotate;
mod camera;
mod config;
mod error;
mod marker;
mod marker_type;

pub use camera::{
    find_camera_ids, BaseCamera, Camera, CameraError, CaptureBackend, ImageFileCamera,
    MarkerProcessor, MarkerSize, SnapshotCamera, VideoCapture, MAX_CAMERA_SCAN,
};
pub use config::CameraConfig;
pub use error::ZolotoError;
pub use marker::{BaseMarker, ComputedPose, EagerMarker, Marker, MarkerObservation, MarkerRecord};
pub use marker_type::MarkerType;

#[cfg(feature = "opencv")]
pub use camera::OpenCvBackend;

pub use zoloto_aruco::{DetectorParams, MarkerDetection};
pub use zoloto_core::{
    CalibrationParameters, Coordinates, Orientation, PoseVectors, Spherical, ThreeDCoordinates,
};

/// Borrow an `image::GrayImage` as the core view type.
pub fn gray_view(img: &::image::GrayImage) -> zoloto_core::GrayImageView<'_> {
    zoloto_core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}
