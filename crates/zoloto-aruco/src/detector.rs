//! End-to-end square-marker detector.

use crate::{
    adaptive_threshold, decode_quad, find_quads, label_components, trace_outer_contours,
    ArucoScanParams, DecodedMarker, Dictionary, Matcher,
};
use serde::{Deserialize, Serialize};
use zoloto_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Detector tuning. Defaults follow OpenCV's `DetectorParameters`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub adaptive_thresh_win_size_min: usize,
    pub adaptive_thresh_win_size_max: usize,
    pub adaptive_thresh_win_size_step: usize,
    pub adaptive_thresh_constant: f32,
    /// Contour length limits, relative to the larger image dimension.
    pub min_marker_perimeter_rate: f32,
    pub max_marker_perimeter_rate: f32,
    /// Douglas-Peucker tolerance relative to the contour length.
    pub polygonal_approx_accuracy_rate: f32,
    /// Minimum side length relative to the contour length.
    pub min_corner_distance_rate: f32,
    pub min_distance_to_border: u32,
    /// Fit lines to the contour sides and intersect them for sub-pixel corners.
    pub refine_corners: bool,
    pub scan: ArucoScanParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3,
            refine_corners: true,
            scan: ArucoScanParams::default(),
        }
    }
}

impl DetectorParams {
    /// Adaptive threshold window sizes, smallest first.
    pub fn window_sizes(&self) -> Vec<usize> {
        let min = self.adaptive_thresh_win_size_min.max(3);
        let max = self.adaptive_thresh_win_size_max.max(min);
        let step = self.adaptive_thresh_win_size_step.max(1);
        (min..=max).step_by(step).collect()
    }
}

/// One detected marker in image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    /// Top-left, top-right, bottom-right, bottom-left of the marker itself.
    pub corners: [[f32; 2]; 4],
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
}

impl MarkerDetection {
    pub fn center(&self) -> [f32; 2] {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + c[0], sy + c[1]));
        [sx / 4.0, sy / 4.0]
    }
}

/// ArUco detector bound to one dictionary.
#[derive(Clone, Debug)]
pub struct ArucoDetector {
    matcher: Matcher,
    params: DetectorParams,
}

impl ArucoDetector {
    pub fn new(dictionary: Dictionary, params: DetectorParams) -> Self {
        let matcher = Matcher::new(dictionary, params.scan.max_hamming);
        Self { matcher, params }
    }

    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect markers, one per id, sorted by id.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image), fields(w = image.width, h = image.height))
    )]
    pub fn detect(&self, image: &GrayImageView<'_>) -> Vec<MarkerDetection> {
        let (w, h) = (image.width, image.height);
        if w == 0 || h == 0 || image.data.len() < w * h {
            log::warn!("detect: image buffer does not match {w}x{h}");
            return Vec::new();
        }

        let params = &self.params;
        let max_dim = w.max(h) as f32;
        let min_points = (params.min_marker_perimeter_rate * max_dim).max(4.0) as usize;
        let max_points = (params.max_marker_perimeter_rate * max_dim) as usize;

        let mut found: Vec<DecodedMarker> = Vec::new();
        for window in params.window_sizes() {
            let bin = adaptive_threshold(image, window, params.adaptive_thresh_constant);
            let components = label_components(&bin);
            let contours = trace_outer_contours(&components, min_points, max_points);
            let quads = find_quads(&contours, w, h, params);
            log::trace!(
                "window {window}: {} components, {} contours, {} quads",
                components.components.len(),
                contours.len(),
                quads.len()
            );

            for quad in quads {
                if found.iter().any(|m| same_quad(&m.corners, &quad.corners)) {
                    continue;
                }
                if let Some(m) = decode_quad(image, &quad.corners, &self.matcher, &params.scan) {
                    found.push(m);
                }
            }
        }

        let out = dedup_by_id(found);
        log::debug!("detected {} markers", out.len());
        out
    }
}

/// Corner sets describing the same physical square, in any cyclic order.
fn same_quad(a: &[nalgebra::Point2<f64>; 4], b: &[nalgebra::Point2<f64>; 4]) -> bool {
    let side = (0..4)
        .map(|i| (a[(i + 1) % 4] - a[i]).norm())
        .sum::<f64>()
        / 4.0;
    let tol = (side * 0.1).max(2.0);
    (0..4).any(|shift| (0..4).all(|k| (a[k] - b[(k + shift) % 4]).norm() <= tol))
}

fn dedup_by_id(mut found: Vec<DecodedMarker>) -> Vec<MarkerDetection> {
    found.sort_by(|a, b| a.id.cmp(&b.id).then(b.score.total_cmp(&a.score)));
    found.dedup_by_key(|m| m.id);
    found
        .into_iter()
        .map(|m| MarkerDetection {
            id: m.id,
            corners: m.corners.map(|p| [p.x as f32, p.y as f32]),
            rotation: m.rotation,
            hamming: m.hamming,
            border_score: m.border_score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtins::DICT_4X4_50, render_marker};
    use nalgebra::Point2;
    use zoloto_core::{homography_from_4pt, warp_perspective_gray, GrayImage};

    fn paste(dst: &mut GrayImage, src: &GrayImage, x0: usize, y0: usize) {
        for y in 0..src.height {
            for x in 0..src.width {
                dst.set(x0 + x, y0 + y, src.get(x, y));
            }
        }
    }

    fn assert_corners_near(got: &[[f32; 2]; 4], want: &[[f32; 2]; 4], tol: f32) {
        for (g, w) in got.iter().zip(want) {
            assert!(
                (g[0] - w[0]).abs() <= tol && (g[1] - w[1]).abs() <= tol,
                "corner {g:?} vs {w:?}"
            );
        }
    }

    #[test]
    fn detects_axis_aligned_marker() {
        let marker = render_marker(&DICT_4X4_50, 7, 12, 1, 0).expect("render");
        let mut canvas = GrayImage::new(160, 120, 255);
        paste(&mut canvas, &marker, 40, 20);

        let det = ArucoDetector::new(DICT_4X4_50, DetectorParams::default()).detect(&canvas.view());
        assert_eq!(det.len(), 1);
        assert_eq!(det[0].id, 7);
        let (lo_x, lo_y, side) = (39.5, 19.5, 72.0);
        let want = [
            [lo_x, lo_y],
            [lo_x + side, lo_y],
            [lo_x + side, lo_y + side],
            [lo_x, lo_y + side],
        ];
        assert_corners_near(&det[0].corners, &want, 0.6);
        let c = det[0].center();
        assert!((c[0] - 75.5).abs() < 0.6 && (c[1] - 55.5).abs() < 0.6);
    }

    #[test]
    fn rotated_marker_keeps_true_top_left() {
        let marker = render_marker(&DICT_4X4_50, 21, 10, 1, 10).expect("render");
        let n = marker.width;
        // One clockwise quarter turn: new(x, y) = old(y, n - 1 - x).
        let mut rotated = GrayImage::new(n, n, 255);
        for y in 0..n {
            for x in 0..n {
                rotated.set(x, y, marker.get(y, n - 1 - x));
            }
        }

        let det = ArucoDetector::new(DICT_4X4_50, DetectorParams::default()).detect(&rotated.view());
        assert_eq!(det.len(), 1);
        assert_eq!(det[0].id, 21);
        let (lo, hi) = (9.5, 69.5);
        assert_corners_near(
            &det[0].corners,
            &[[hi, lo], [hi, hi], [lo, hi], [lo, lo]],
            0.6,
        );
    }

    #[test]
    fn detects_marker_under_perspective() {
        let marker = render_marker(&DICT_4X4_50, 33, 10, 1, 10).expect("render");
        let (lo, hi) = (9.5, 69.5);
        let src = [
            Point2::new(lo, lo),
            Point2::new(hi, lo),
            Point2::new(hi, hi),
            Point2::new(lo, hi),
        ];
        let dst = [
            Point2::new(62.0, 40.0),
            Point2::new(170.0, 55.0),
            Point2::new(160.0, 150.0),
            Point2::new(50.0, 130.0),
        ];
        let h_src_from_dst = homography_from_4pt(&dst, &src).expect("homography");
        let warped = warp_perspective_gray(&marker.view(), &h_src_from_dst, 220, 200, 255);

        let det = ArucoDetector::new(DICT_4X4_50, DetectorParams::default()).detect(&warped.view());
        assert_eq!(det.len(), 1);
        assert_eq!(det[0].id, 33);
        let want = dst.map(|p| [p.x as f32, p.y as f32]);
        assert_corners_near(&det[0].corners, &want, 1.5);
    }

    #[test]
    fn several_markers_sorted_by_id() {
        let mut canvas = GrayImage::new(320, 120, 255);
        for (slot, id) in [9u32, 2, 40].into_iter().enumerate() {
            let m = render_marker(&DICT_4X4_50, id, 10, 1, 0).expect("render");
            paste(&mut canvas, &m, 20 + slot * 100, 30);
        }
        let det = ArucoDetector::new(DICT_4X4_50, DetectorParams::default()).detect(&canvas.view());
        let ids: Vec<u32> = det.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 9, 40]);
    }

    #[test]
    fn empty_and_blank_images() {
        let detector = ArucoDetector::new(DICT_4X4_50, DetectorParams::default());
        assert!(detector.detect(&GrayImage::new(64, 48, 255).view()).is_empty());
        assert!(detector.detect(&GrayImage::new(0, 0, 0).view()).is_empty());
    }

    #[test]
    fn params_round_trip_with_partial_json() {
        let params: DetectorParams =
            serde_json::from_str(r#"{"adaptive_thresh_constant": 5.0, "scan": {"max_hamming": 1}}"#)
                .expect("parse");
        assert_eq!(params.adaptive_thresh_constant, 5.0);
        assert_eq!(params.scan.max_hamming, 1);
        assert_eq!(params.scan.border_bits, 1);
        assert_eq!(params.window_sizes(), vec![3, 13, 23]);
    }
}
