use crate::{CameraError, CaptureBackend, VideoCapture};
use image::RgbImage;
use opencv::prelude::*;
use opencv::{core, imgproc, videoio};

fn backend_err(e: opencv::Error) -> CameraError {
    CameraError::Backend(e.to_string())
}

/// Capture through OpenCV's `videoio` module.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvBackend;

impl CaptureBackend for OpenCvBackend {
    fn open(&self, camera_id: u32) -> Result<Box<dyn VideoCapture>, CameraError> {
        let cap =
            videoio::VideoCapture::new(camera_id as i32, videoio::CAP_ANY).map_err(backend_err)?;
        Ok(Box::new(OpenCvCapture { camera_id, cap }))
    }
}

struct OpenCvCapture {
    camera_id: u32,
    cap: videoio::VideoCapture,
}

impl VideoCapture for OpenCvCapture {
    fn is_opened(&self) -> bool {
        self.cap.is_opened().unwrap_or(false)
    }

    fn read(&mut self) -> Result<RgbImage, CameraError> {
        let mut mat = core::Mat::default();
        let ok = self.cap.read(&mut mat).map_err(backend_err)?;
        if !ok || mat.empty() {
            return Err(CameraError::ReadFailed(self.camera_id));
        }

        let mut rgb = core::Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(backend_err)?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes().map_err(backend_err)?.to_vec();
        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| CameraError::Backend(format!("unexpected frame layout {width}x{height}")))
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        self.cap
            .set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)
            .map_err(backend_err)?;
        self.cap
            .set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)
            .map_err(backend_err)?;
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            log::debug!("camera {}: release failed: {e}", self.camera_id);
        }
    }
}
