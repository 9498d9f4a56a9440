use image::RgbImage;

/// Number of device indices tried by [`find_camera_ids`].
pub const MAX_CAMERA_SCAN: u32 = 8;

#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("camera {0} could not be opened")]
    NotFound(u32),
    #[error("camera {0} returned no frame")]
    ReadFailed(u32),
    #[error("capture backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// An open (or failed-to-open) video device.
pub trait VideoCapture {
    fn is_opened(&self) -> bool;

    /// Grab and decode the next frame.
    fn read(&mut self) -> Result<RgbImage, CameraError>;

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError>;

    /// Free the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// Factory for [`VideoCapture`] handles by device index.
pub trait CaptureBackend {
    /// Returns a handle even when the device is absent; check
    /// [`VideoCapture::is_opened`]. Errors are reserved for backend failures.
    fn open(&self, camera_id: u32) -> Result<Box<dyn VideoCapture>, CameraError>;
}

/// Device indices in `0..MAX_CAMERA_SCAN` whose capture opens.
///
/// Every capture is released before returning.
pub fn find_camera_ids(backend: &dyn CaptureBackend) -> Vec<u32> {
    let mut ids = Vec::new();
    for camera_id in 0..MAX_CAMERA_SCAN {
        let mut capture = match backend.open(camera_id) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("camera {camera_id}: {e}");
                continue;
            }
        };
        if capture.is_opened() {
            ids.push(camera_id);
        }
        capture.release();
    }
    log::debug!("found cameras {ids:?}");
    ids
}
