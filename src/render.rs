// src/render.rs
//
// Annotated-frame drawing: per-identity colors, provenance-weighted box
// outlines, id labels and a status line. Purely a debug aid; nothing drawn
// here feeds back into tracking.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::associator::TrackedBox;
use crate::capabilities::Frame;
use crate::pipeline::RunStats;
use crate::track::Provenance;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
/// Detector-confirmed boxes draw heavier than tracker-coasted ones.
const DETECTOR_STROKE: i32 = 3;
const TRACKER_STROKE: i32 = 2;

/// Identity color by golden-angle hue stepping: consecutive ids land far
/// apart on the hue wheel and the same id is stable across runs.
pub fn id_color(id: u32) -> Rgb<u8> {
    let hue = (id as f32 * 137.508) % 360.0;
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Rgb([
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ])
}

/// Draw every reported track plus the status line onto a copy of `frame`.
pub fn annotate(frame: &Frame, rows: &[TrackedBox], stats: &RunStats) -> Frame {
    let mut canvas = frame.image.clone();
    for row in rows {
        draw_track(&mut canvas, row);
    }
    let status = format!(
        "TRACKING: {} | IDS: {} | FPS: {:.1}",
        rows.len(),
        stats.total_persons,
        stats.avg_fps
    );
    draw_text(&mut canvas, 10, 10, 2, WHITE, &status);
    Frame {
        index: frame.index,
        timestamp_ms: frame.timestamp_ms,
        image: canvas,
    }
}

fn draw_track(canvas: &mut RgbImage, row: &TrackedBox) {
    let Some((x, y, w, h)) = row.bbox.to_pixel_rect(canvas.width(), canvas.height()) else {
        return;
    };
    let color = id_color(row.id);
    let stroke = match row.provenance {
        Provenance::Detector => DETECTOR_STROKE,
        Provenance::Tracker => TRACKER_STROKE,
    };
    draw_box_outline(canvas, x, y, w, h, stroke, color);

    // Identity tag above the box, clamped inside the frame
    let label = format!("ID:{}", row.id);
    let scale = 2;
    let (label_w, label_h) = text_size(scale, &label);
    let tag_x = x.max(0);
    let tag_y = (y - label_h as i32 - 6).max(0);
    draw_filled_rect_mut(
        canvas,
        Rect::at(tag_x, tag_y).of_size(label_w + 8, label_h + 6),
        color,
    );
    draw_text(canvas, tag_x + 4, tag_y + 3, scale, WHITE, &label);

    // Provenance and confidence under the box
    let detail = format!("{} {:.2}", row.provenance.as_str(), row.confidence);
    draw_text(canvas, x, y + h as i32 + 4, 1, color, &detail);
}

/// Nested hollow rectangles, inset one pixel per ring.
fn draw_box_outline(canvas: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, stroke: i32, color: Rgb<u8>) {
    for inset in 0..stroke {
        let rw = w as i32 - 2 * inset;
        let rh = h as i32 - 2 * inset;
        if rw < 1 || rh < 1 {
            break;
        }
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x + inset, y + inset).of_size(rw as u32, rh as u32),
            color,
        );
    }
}

// ============================================================================
// BITMAP TEXT
// ============================================================================
// 5x7 glyphs, enough for status lines and id tags without pulling a font
// rasterizer into the crate.

/// Pixel footprint of a rendered string at the given scale.
fn text_size(scale: u32, text: &str) -> (u32, u32) {
    let width = (text.chars().count() as u32 * 6 * scale).saturating_sub(scale);
    (width, 7 * scale)
}

fn draw_text(canvas: &mut RgbImage, x: i32, y: i32, scale: u32, color: Rgb<u8>, text: &str) {
    let mut cursor_x = x;
    for ch in text.chars() {
        if let Some(glyph) = glyph_rows(ch) {
            for (row_idx, bits) in glyph.iter().enumerate() {
                for col in 0..5u32 {
                    if bits & (0b10000 >> col) != 0 {
                        draw_filled_rect_mut(
                            canvas,
                            Rect::at(
                                cursor_x + (col * scale) as i32,
                                y + (row_idx as u32 * scale) as i32,
                            )
                            .of_size(scale, scale),
                            color,
                        );
                    }
                }
            }
        }
        cursor_x += (6 * scale) as i32;
    }
}

#[rustfmt::skip]
fn glyph_rows(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch.to_ascii_uppercase() {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        ':' => [0b00000, 0b00100, 0b00100, 0b00000, 0b00100, 0b00100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110],
        '|' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        _ => return None,
    };
    Some(glyph)
}

// ============================================================================
// TESTS
// ============================================================================
