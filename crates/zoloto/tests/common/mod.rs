#![allow(dead_code)]

use image::{Rgb, RgbImage};
use nalgebra::Point2;
use zoloto::aruco::{builtins::DICT_4X4_50, render_marker};
use zoloto::core::{
    homography_from_4pt, marker_object_points, project_points, warp_perspective_gray,
    CalibrationParameters, CameraIntrinsics, GrayImage, PoseVectors,
};

pub const CELL_PX: usize = 20;
pub const QUIET_PX: usize = 20;

pub fn calibration() -> CalibrationParameters {
    CalibrationParameters::new(
        CameraIntrinsics {
            fx: 800.0,
            fy: 800.0,
            cx: 320.0,
            cy: 240.0,
        },
        &[],
        (640, 480),
    )
}

pub fn to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width as u32, gray.height as u32, |x, y| {
        let v = gray.get(x as usize, y as usize);
        Rgb([v, v, v])
    })
}

/// A 4x4_50 marker axis-aligned on a white canvas.
pub fn flat_frame(id: u32) -> RgbImage {
    let marker = render_marker(&DICT_4X4_50, id, CELL_PX, 1, QUIET_PX).expect("render");
    let mut canvas = GrayImage::new(marker.width + 80, marker.height + 60, 255);
    for y in 0..marker.height {
        for x in 0..marker.width {
            canvas.set(x + 40, y + 30, marker.get(x, y));
        }
    }
    to_rgb(&canvas)
}

/// Render marker `id` as seen by [`calibration`] from `pose`; returns the frame
/// and the true pixel corners.
pub fn posed_frame(id: u32, size: f64, pose: &PoseVectors) -> (RgbImage, [Point2<f64>; 4]) {
    let calib = calibration();
    let marker = render_marker(&DICT_4X4_50, id, CELL_PX, 1, QUIET_PX).expect("render");
    let lo = QUIET_PX as f64 - 0.5;
    let hi = (marker.width - QUIET_PX) as f64 - 0.5;
    let src = [
        Point2::new(lo, lo),
        Point2::new(hi, lo),
        Point2::new(hi, hi),
        Point2::new(lo, hi),
    ];
    let projected = project_points(&marker_object_points(size), pose, &calib).expect("in front");
    let dst = [projected[0], projected[1], projected[2], projected[3]];
    let h_src_from_dst = homography_from_4pt(&dst, &src).expect("homography");
    let (w, h) = calib.resolution;
    let warped = warp_perspective_gray(&marker.view(), &h_src_from_dst, w as usize, h as usize, 255);
    (to_rgb(&warped), dst)
}
