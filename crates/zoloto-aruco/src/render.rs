//! Marker rendering.

use crate::{Dictionary, MAX_BORDER_BITS};
use zoloto_core::GrayImage;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("marker id {id} is out of range for {dictionary} ({len} markers)")]
    UnknownId {
        id: u32,
        dictionary: &'static str,
        len: usize,
    },
    #[error("cell size must be at least one pixel")]
    ZeroCellSize,
    #[error("border of {border_bits} cells exceeds the maximum of {max}")]
    BorderTooWide { border_bits: usize, max: usize },
}

/// Render marker `id` as black/white cells of `cell_px` pixels, surrounded by
/// `border_bits` black cells and a white quiet zone of `quiet_zone_px` pixels.
///
/// The output is square with side `2 * quiet_zone_px + (n + 2 * border_bits) * cell_px`.
pub fn render_marker(
    dict: &Dictionary,
    id: u32,
    cell_px: usize,
    border_bits: usize,
    quiet_zone_px: usize,
) -> Result<GrayImage, RenderError> {
    if cell_px == 0 {
        return Err(RenderError::ZeroCellSize);
    }
    if border_bits > MAX_BORDER_BITS {
        return Err(RenderError::BorderTooWide {
            border_bits,
            max: MAX_BORDER_BITS,
        });
    }
    let code = dict.code(id).ok_or(RenderError::UnknownId {
        id,
        dictionary: dict.name,
        len: dict.len(),
    })?;

    let n = dict.marker_size;
    let cells = n + 2 * border_bits;
    let side = 2 * quiet_zone_px + cells * cell_px;
    let mut img = GrayImage::new(side, side, 255);

    for cy in 0..cells {
        for cx in 0..cells {
            let is_border = cx < border_bits
                || cy < border_bits
                || cx >= cells - border_bits
                || cy >= cells - border_bits;
            let white = !is_border && {
                let idx = (cy - border_bits) * n + (cx - border_bits);
                (code >> idx) & 1 == 1
            };
            if !white {
                img.fill_rect(
                    quiet_zone_px + cx * cell_px,
                    quiet_zone_px + cy * cell_px,
                    cell_px,
                    cell_px,
                    0,
                );
            }
        }
    }

    Ok(img)
}
