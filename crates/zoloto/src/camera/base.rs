use crate::{annotate, CameraError, EagerMarker, Marker, MarkerProcessor, ZolotoError};
use image::RgbImage;
use std::path::Path;

/// A frame source plus the marker pipeline that runs on its frames.
pub trait BaseCamera {
    fn processor(&self) -> &MarkerProcessor;

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError>;

    fn process_frame(&mut self) -> Result<Vec<Marker>, ZolotoError> {
        let frame = self.capture_frame()?;
        Ok(self.process_image(&frame))
    }

    fn process_frame_eager(&mut self) -> Result<Vec<EagerMarker>, ZolotoError> {
        let frame = self.capture_frame()?;
        self.process_image_eager(&frame)
    }

    fn get_visible_markers(&mut self) -> Result<Vec<u32>, ZolotoError> {
        let frame = self.capture_frame()?;
        Ok(self.processor().visible_marker_ids(&frame))
    }

    /// Run the pipeline on a caller-supplied frame.
    fn process_image(&self, frame: &RgbImage) -> Vec<Marker> {
        self.processor().markers(frame)
    }

    fn process_image_eager(&self, frame: &RgbImage) -> Result<Vec<EagerMarker>, ZolotoError> {
        self.processor().eager_markers(frame)
    }

    /// Capture a frame, optionally annotate it, and write it to `path`.
    fn save_frame(&mut self, path: &Path, annotate: bool) -> Result<RgbImage, ZolotoError> {
        let mut frame = self.capture_frame()?;
        if annotate {
            self.annotate_frame(&mut frame);
        }
        frame.save(path)?;
        log::debug!("saved frame to {}", path.display());
        Ok(frame)
    }

    fn annotate_frame(&self, frame: &mut RgbImage) {
        let detections = self.processor().detect(frame);
        annotate::annotate_frame(frame, &detections);
    }
}
