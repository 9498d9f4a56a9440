//! Core types and utilities for fiducial marker pose estimation.
//!
//! This crate is purely geometric. It does *not* depend on any concrete marker
//! detector, capture backend or image crate: corners come in as pixel
//! coordinates, poses go out as Rodrigues rotation / translation vectors.

mod calibration;
mod coords;
mod homography;
mod image;
mod logger;
mod pose;

pub use calibration::{
    parse_calibration_file, BrownConrady, CalibrationError, CalibrationParameters,
    CameraIntrinsics, UndistortConfig,
};
pub use coords::{Coordinates, Orientation, Spherical, ThreeDCoordinates};
pub use homography::{estimate_homography, homography_from_4pt, warp_perspective_gray, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use pose::{
    estimate_marker_pose, estimate_marker_poses, marker_object_points, project_points,
    reprojection_rmse, PoseError, PoseVectors,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV_VAR};
