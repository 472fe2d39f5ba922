// Draws the detected lane back onto the camera view: filled lane polygon in
// bird's-eye space, inverse-warped, alpha-blended over the undistorted
// frame, plus a small HUD with curvature and offset. Inputs are never
// mutated; the annotated frame is a fresh buffer.

use crate::perspective::PerspectiveMap;
use crate::types::{FrameRecord, LaneState, OverlayConfig};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

/// Overlay colors (RGB).
pub mod colors {
    use image::Rgb;

    pub const LANE_FILL: Rgb<u8> = Rgb([0, 180, 60]);
    pub const LEFT_LINE: Rgb<u8> = Rgb([220, 40, 40]);
    pub const RIGHT_LINE: Rgb<u8> = Rgb([40, 60, 220]);
    pub const HUD_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
    pub const HUD_WARN: Rgb<u8> = Rgb([240, 80, 40]);
}

/// Vertical spacing of the sampled curve points, in rows.
const CURVE_SAMPLE_STEP: u32 = 8;

#[derive(Debug)]
pub struct OverlayRenderer {
    config: OverlayConfig,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    /// Compose the annotated output frame.
    pub fn render(
        &self,
        undistorted: &RgbImage,
        state: &LaneState,
        map: &PerspectiveMap,
        record: &FrameRecord,
    ) -> RgbImage {
        let mut out = undistorted.clone();

        if record.lanes_valid {
            let lane_layer = self.lane_layer(undistorted.dimensions(), state);
            let reprojected = map.warp_inverse(&lane_layer);
            blend_weighted(&mut out, &reprojected, self.config.lane_alpha);
        }

        self.draw_hud(&mut out, record);
        out
    }

    /// Filled polygon between the two fitted curves, in bird's-eye space.
    fn lane_layer(&self, (w, h): (u32, u32), state: &LaneState) -> RgbImage {
        let mut layer = RgbImage::new(w, h);

        let mut poly: Vec<Point<i32>> = Vec::new();
        let mut left_pts: Vec<(f32, f32)> = Vec::new();
        let mut right_pts: Vec<(f32, f32)> = Vec::new();

        let mut y = 0u32;
        loop {
            let yf = y as f64;
            left_pts.push((state.left.pixel.eval(yf) as f32, y as f32));
            right_pts.push((state.right.pixel.eval(yf) as f32, y as f32));
            if y >= h - 1 {
                break;
            }
            y = (y + CURVE_SAMPLE_STEP).min(h - 1);
        }

        for &(x, y) in &left_pts {
            poly.push(Point::new(x as i32, y as i32));
        }
        for &(x, y) in right_pts.iter().rev() {
            poly.push(Point::new(x as i32, y as i32));
        }
        if poly.first() != poly.last() {
            draw_polygon_mut(&mut layer, &poly, colors::LANE_FILL);
        }

        for seg in left_pts.windows(2) {
            draw_line_segment_mut(&mut layer, seg[0], seg[1], colors::LEFT_LINE);
        }
        for seg in right_pts.windows(2) {
            draw_line_segment_mut(&mut layer, seg[0], seg[1], colors::RIGHT_LINE);
        }

        layer
    }

    fn draw_hud(&self, out: &mut RgbImage, record: &FrameRecord) {
        let scale = self.config.text_scale.max(1);
        let line_height = 9 * scale;

        if record.lanes_valid {
            let radius_line = format!(
                "RADIUS L {:.0}M R {:.0}M",
                record.left_curvature_m, record.right_curvature_m
            );
            let offset_line = format!("OFFSET {:+.2}M", record.vehicle_offset_m);
            font::draw_text(out, &radius_line, 12, 12, scale, colors::HUD_TEXT);
            font::draw_text(out, &offset_line, 12, 12 + line_height, scale, colors::HUD_TEXT);
        } else {
            font::draw_text(out, "LANE LOST", 12, 12, scale, colors::HUD_WARN);
        }
    }
}

/// out = out + alpha · layer, per channel, saturating. Black layer pixels
/// leave the frame untouched, so only the drawn lane region tints.
fn blend_weighted(out: &mut RgbImage, layer: &RgbImage, alpha: f32) {
    for (dst, src) in out.pixels_mut().zip(layer.pixels()) {
        for c in 0..3 {
            let blended = dst[c] as f32 + alpha * src[c] as f32;
            dst[c] = blended.min(255.0) as u8;
        }
    }
}

/// Minimal built-in 5×7 raster font for the HUD. Covers the digits plus the
/// letters the overlay actually prints; unknown characters render as space.
mod font {
    use image::{Rgb, RgbImage};

    const GLYPH_W: u32 = 5;
    const GLYPH_H: u32 = 7;

    fn glyph(ch: char) -> [u8; 7] {
        match ch {
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
            'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
            'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            _ => [0; 7],
        }
    }

    pub fn draw_text(
        img: &mut RgbImage,
        text: &str,
        x: u32,
        y: u32,
        scale: u32,
        color: Rgb<u8>,
    ) {
        let (w, h) = img.dimensions();
        let mut pen_x = x;
        for ch in text.chars() {
            let rows = glyph(ch.to_ascii_uppercase());
            for (gy, row) in rows.iter().enumerate() {
                for gx in 0..GLYPH_W {
                    if row & (0x10 >> gx) == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let px = pen_x + gx * scale + sx;
                            let py = y + gy as u32 * scale + sy;
                            if px < w && py < h {
                                img.put_pixel(px, py, color);
                            }
                        }
                    }
                }
            }
            pen_x += (GLYPH_W + 1) * scale;
        }
    }
}
