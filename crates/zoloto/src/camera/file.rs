use crate::{BaseCamera, CameraError, MarkerProcessor};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// A "camera" whose every frame is the image stored at `path`.
#[derive(Clone, Debug)]
pub struct ImageFileCamera {
    path: PathBuf,
    processor: MarkerProcessor,
}

impl ImageFileCamera {
    pub fn new(path: impl Into<PathBuf>, processor: MarkerProcessor) -> Self {
        Self {
            path: path.into(),
            processor,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaseCamera for ImageFileCamera {
    fn processor(&self) -> &MarkerProcessor {
        &self.processor
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        Ok(image::open(&self.path)?.to_rgb8())
    }
}
