//! Camera wrappers and capture backends.

mod base;
mod capture;
mod file;
mod live;
#[cfg(feature = "opencv")]
mod opencv_backend;
mod processor;
mod snapshot;

pub use base::BaseCamera;
pub use capture::{find_camera_ids, CameraError, CaptureBackend, VideoCapture, MAX_CAMERA_SCAN};
pub use file::ImageFileCamera;
pub use live::Camera;
#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvBackend;
pub use processor::{MarkerProcessor, MarkerSize};
pub use snapshot::SnapshotCamera;
