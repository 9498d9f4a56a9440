//! Global (Otsu) and local (adaptive mean) thresholding.

use zoloto_core::GrayImageView;

/// Binary mask with `1` for dark (foreground) pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl BinaryImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn dark_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Compute Otsu threshold from a set of sample intensities.
///
/// Values `<= threshold` belong to the dark class.
pub fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut min_v = 255u8;
    let mut max_v = 0u8;
    for &v in samples {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Adaptive mean threshold.
///
/// A pixel is dark when `v <= mean(window) - c`, with the window clipped at
/// the image border. Even window sizes are rounded up to the next odd size.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(img)))]
pub fn adaptive_threshold(img: &GrayImageView<'_>, window: usize, c: f32) -> BinaryImage {
    let (w, h) = (img.width, img.height);
    let mut out = BinaryImage::new(w, h);
    if w == 0 || h == 0 || img.data.len() < w * h {
        return out;
    }

    let integral = integral_image(img);
    let stride = w + 1;
    let r = (window.max(1) | 1) / 2;

    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as f32;
            let mean = sum as f32 / count;
            let v = img.data[y * w + x] as f32;
            if v <= mean - c {
                out.data[y * w + x] = 1;
            }
        }
    }
    out
}

/// Summed-area table with a zero first row and column.
fn integral_image(img: &GrayImageView<'_>) -> Vec<u64> {
    let (w, h) = (img.width, img.height);
    let stride = w + 1;
    let mut sat = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0u64;
        for x in 0..w {
            row += img.data[y * w + x] as u64;
            sat[(y + 1) * stride + x + 1] = sat[y * stride + x + 1] + row;
        }
    }
    sat
}
