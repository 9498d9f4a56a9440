use crate::{
    find_camera_ids, BaseCamera, CameraConfig, CameraError, CaptureBackend, MarkerProcessor,
    VideoCapture, ZolotoError,
};
use image::RgbImage;

/// A camera that keeps its capture device open between frames.
///
/// The device is released on [`Camera::close`] or drop.
pub struct Camera {
    camera_id: u32,
    capture: Box<dyn VideoCapture>,
    processor: MarkerProcessor,
}

impl Camera {
    /// Open `camera_id`, applying the calibration resolution if there is one.
    pub fn open(
        backend: &dyn CaptureBackend,
        camera_id: u32,
        processor: MarkerProcessor,
    ) -> Result<Self, CameraError> {
        let mut capture = backend.open(camera_id)?;
        if !capture.is_opened() {
            capture.release();
            return Err(CameraError::NotFound(camera_id));
        }
        if let Some(calibration) = processor.calibration() {
            let (w, h) = calibration.resolution;
            if let Err(e) = capture.set_resolution(w, h) {
                capture.release();
                return Err(e);
            }
        }
        log::info!("opened camera {camera_id}");
        Ok(Self {
            camera_id,
            capture,
            processor,
        })
    }

    /// One camera per id reported by [`find_camera_ids`].
    pub fn discover(
        backend: &dyn CaptureBackend,
        config: &CameraConfig,
    ) -> Result<Vec<Camera>, ZolotoError> {
        let processor = config.build_processor()?;
        find_camera_ids(backend)
            .into_iter()
            .map(|id| Ok(Camera::open(backend, id, processor.clone())?))
            .collect()
    }

    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }

    pub fn close(&mut self) {
        self.capture.release();
    }
}

impl BaseCamera for Camera {
    fn processor(&self) -> &MarkerProcessor {
        &self.processor
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        self.capture.read()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("camera_id", &self.camera_id)
            .field("marker_type", &self.processor.marker_type())
            .finish_non_exhaustive()
    }
}
