use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::models::{BoundingBox, Detection};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

/// Copy of `frame` with a green outline around every detection.
pub fn draw_detections(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = frame.clone();
    for detection in detections {
        draw_box(&mut canvas, &detection.bbox, BOX_COLOR);
    }
    canvas
}

/// Outline `bbox` with nested one-pixel rectangles, innermost last.
pub fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let clamped = bbox.clamp_to(canvas.width(), canvas.height());
    for inset in 0..BOX_THICKNESS {
        let (w, h) = (clamped.width(), clamped.height());
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let rect = Rect::at((clamped.x1 + inset) as i32, (clamped.y1 + inset) as i32)
            .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
