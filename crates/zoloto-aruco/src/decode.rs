//! Bit sampling and dictionary lookup for one quadrilateral.

use crate::threshold::otsu_threshold_from_samples;
use crate::Matcher;
use nalgebra::Point2;
use serde::{Deserialize, Deserializer, Serialize};
use zoloto_core::{homography_from_4pt, GrayImageView};

/// Below this many image pixels per cell the 3x3 sampling mixes neighbours.
const MIN_PX_PER_CELL: f64 = 2.0;
/// Minimum spread between darkest and brightest cell.
const MIN_CONTRAST: u8 = 20;
const THRESH_SUBDIV: usize = 3;
/// Widest accepted marker border, in cells.
pub const MAX_BORDER_BITS: usize = 8;

/// Decoder configuration for one marker quad.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArucoScanParams {
    /// Marker border width in cells (OpenCV uses 1), at most [`MAX_BORDER_BITS`].
    #[serde(deserialize_with = "bounded_border_bits")]
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Maximum accepted Hamming distance to a dictionary code.
    pub max_hamming: u8,
}

impl Default for ArucoScanParams {
    fn default() -> Self {
        Self {
            border_bits: 1,
            min_border_score: 0.85,
            max_hamming: 0,
        }
    }
}

fn bounded_border_bits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let v = usize::deserialize(deserializer)?;
    if v > MAX_BORDER_BITS {
        return Err(serde::de::Error::custom(format!(
            "border_bits {v} exceeds the maximum of {MAX_BORDER_BITS}"
        )));
    }
    Ok(v)
}

/// A decoded marker with corners in its canonical order.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMarker {
    pub id: u32,
    /// `corners[0]` is the marker's top-left, then clockwise.
    pub corners: [Point2<f64>; 4],
    /// Rotation reported by the matcher for the input corner order.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// `border_score` penalised by the fraction of corrected bits.
    pub score: f32,
    /// Observed inner bits, row-major, white = 1, in the input corner frame.
    pub code: u64,
}

/// Sample the `(n + 2 * border)^2` cell grid inside `corners` and match it.
///
/// `corners` must run clockwise in image space; the start corner is arbitrary.
pub fn decode_quad(
    image: &GrayImageView<'_>,
    corners: &[Point2<f64>; 4],
    matcher: &Matcher,
    params: &ArucoScanParams,
) -> Option<DecodedMarker> {
    let dict = matcher.dictionary();
    let bits = dict.marker_size;
    if bits == 0 || bits * bits > 64 {
        return None;
    }
    let border = params.border_bits;
    if border > MAX_BORDER_BITS {
        log::debug!("border_bits {border} exceeds {MAX_BORDER_BITS}, skipping quad");
        return None;
    }
    let cells = bits + 2 * border;

    let min_side = (0..4)
        .map(|i| (corners[(i + 1) % 4] - corners[i]).norm())
        .fold(f64::INFINITY, f64::min);
    if min_side < cells as f64 * MIN_PX_PER_CELL {
        return None;
    }

    let s = cells as f64;
    let rect = [
        Point2::new(0.0, 0.0),
        Point2::new(s, 0.0),
        Point2::new(s, s),
        Point2::new(0.0, s),
    ];
    let h = homography_from_4pt(&rect, corners)?;

    let mut samples = Vec::with_capacity(cells * cells);
    for cy in 0..cells {
        for cx in 0..cells {
            let q = h.apply(Point2::new(cx as f64 + 0.5, cy as f64 + 0.5));
            samples.push(sample_mean_3x3(image, q.x, q.y)?);
        }
    }

    let grid = cells * THRESH_SUBDIV;
    let step = s / grid as f64;
    let mut thr_samples = Vec::with_capacity(grid * grid);
    for ty in 0..grid {
        for tx in 0..grid {
            let q = h.apply(Point2::new(
                (tx as f64 + 0.5) * step,
                (ty as f64 + 0.5) * step,
            ));
            if let Some(v) = sample_mean_3x3(image, q.x, q.y) {
                thr_samples.push(v);
            }
        }
    }

    let (lo, hi) = samples
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi.saturating_sub(lo) < MIN_CONTRAST {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(&samples)
    } else {
        otsu_threshold_from_samples(&thr_samples)
    };
    let (code, border_score) = read_bits(&samples, thr, cells, bits, border);
    if border_score < params.min_border_score {
        return None;
    }

    let m = matcher.match_code(code)?;
    if m.hamming > params.max_hamming {
        return None;
    }
    let r = m.rotation as usize;
    let rotated = [0, 1, 2, 3].map(|k| corners[(k + r) % 4]);
    let ham_pen = 1.0 - m.hamming as f32 / dict.bit_count() as f32;

    Some(DecodedMarker {
        id: m.id,
        corners: rotated,
        rotation: m.rotation,
        hamming: m.hamming,
        border_score,
        score: (border_score * ham_pen).clamp(0.0, 1.0),
        code,
    })
}

/// Split cell means into a packed inner code and the dark-border fraction.
fn read_bits(samples: &[u8], thr: u8, cells: usize, bits: usize, border: usize) -> (u64, f32) {
    let mut border_ok = 0u32;
    let mut border_total = 0u32;
    let mut code = 0u64;

    for cy in 0..cells {
        for cx in 0..cells {
            let is_black = samples[cy * cells + cx] <= thr;
            let is_border = cx < border || cy < border || cx >= cells - border || cy >= cells - border;
            if is_border {
                border_total += 1;
                if is_black {
                    border_ok += 1;
                }
            } else if !is_black {
                let idx = (cy - border) * bits + (cx - border);
                code |= 1u64 << idx;
            }
        }
    }

    let score = if border_total > 0 {
        border_ok as f32 / border_total as f32
    } else {
        1.0
    };
    (code, score)
}

/// Mean of the 3x3 block around the pixel nearest to `(x, y)`.
fn sample_mean_3x3(img: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let ix = x.round() as i32;
    let iy = y.round() as i32;
    if ix < 1 || iy < 1 || ix + 1 >= img.width as i32 || iy + 1 >= img.height as i32 {
        return None;
    }

    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.data[(iy + dy) as usize * img.width + (ix + dx) as usize] as u32;
        }
    }
    Some((sum / 9) as u8)
}
