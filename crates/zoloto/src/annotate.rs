//! Draw detected markers onto RGB frames.
//!
//! Each marker gets a green outline, a red box on its top-left corner (corner 0)
//! and its id written next to the centre.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use zoloto_aruco::MarkerDetection;

pub const OUTLINE_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CORNER_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TEXT_COLOUR: Rgb<u8> = Rgb([0, 0, 255]);

const CORNER_HALF_SIZE: i32 = 3;
const GLYPH_SCALE: i32 = 2;

// 3x5 bitmap digits, one row per entry, MSB is the left column.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Draw every detection onto `frame` in place.
pub fn annotate_frame(frame: &mut RgbImage, detections: &[MarkerDetection]) {
    for det in detections {
        draw_marker(frame, det);
    }
}

fn draw_marker(frame: &mut RgbImage, det: &MarkerDetection) {
    let pts = det.corners.map(|[x, y]| (x, y));
    for i in 0..4 {
        draw_line_segment_mut(frame, pts[i], pts[(i + 1) % 4], OUTLINE_COLOUR);
    }

    let (x0, y0) = (pts[0].0.round() as i32, pts[0].1.round() as i32);
    let side = (2 * CORNER_HALF_SIZE + 1) as u32;
    draw_filled_rect_mut(
        frame,
        Rect::at(x0 - CORNER_HALF_SIZE, y0 - CORNER_HALF_SIZE).of_size(side, side),
        CORNER_COLOUR,
    );

    let [cx, cy] = det.center();
    draw_number(frame, cx.round() as i32, cy.round() as i32, det.id, TEXT_COLOUR);
}

/// Write `n` with its top-left at `(x, y)`.
fn draw_number(frame: &mut RgbImage, x: i32, y: i32, n: u32, colour: Rgb<u8>) {
    let advance = 4 * GLYPH_SCALE;
    let cell = GLYPH_SCALE as u32;
    for (i, ch) in n.to_string().bytes().enumerate() {
        let glyph = &DIGITS[(ch - b'0') as usize];
        let gx = x + i as i32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    let rect = Rect::at(gx + col * GLYPH_SCALE, y + row as i32 * GLYPH_SCALE)
                        .of_size(cell, cell);
                    draw_filled_rect_mut(frame, rect, colour);
                }
            }
        }
    }
}
