use crate::{
    find_camera_ids, BaseCamera, CameraConfig, CameraError, CaptureBackend, MarkerProcessor,
    ZolotoError,
};
use image::RgbImage;
use std::sync::Arc;

/// A camera that opens the device for each frame and releases it afterwards.
///
/// Slower per frame than [`crate::Camera`], but never holds the device.
pub struct SnapshotCamera {
    camera_id: u32,
    backend: Arc<dyn CaptureBackend>,
    processor: MarkerProcessor,
}

impl SnapshotCamera {
    pub fn new(backend: Arc<dyn CaptureBackend>, camera_id: u32, processor: MarkerProcessor) -> Self {
        Self {
            camera_id,
            backend,
            processor,
        }
    }

    pub fn discover(
        backend: Arc<dyn CaptureBackend>,
        config: &CameraConfig,
    ) -> Result<Vec<SnapshotCamera>, ZolotoError> {
        let processor = config.build_processor()?;
        Ok(find_camera_ids(backend.as_ref())
            .into_iter()
            .map(|id| SnapshotCamera::new(Arc::clone(&backend), id, processor.clone()))
            .collect())
    }

    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }
}

impl BaseCamera for SnapshotCamera {
    fn processor(&self) -> &MarkerProcessor {
        &self.processor
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        let mut capture = self.backend.open(self.camera_id)?;
        let frame = if !capture.is_opened() {
            Err(CameraError::NotFound(self.camera_id))
        } else {
            match self.processor.calibration() {
                Some(c) => capture
                    .set_resolution(c.resolution.0, c.resolution.1)
                    .and_then(|()| capture.read()),
                None => capture.read(),
            }
        };
        capture.release();
        frame
    }
}

impl std::fmt::Debug for SnapshotCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCamera")
            .field("camera_id", &self.camera_id)
            .field("marker_type", &self.processor.marker_type())
            .finish_non_exhaustive()
    }
}
