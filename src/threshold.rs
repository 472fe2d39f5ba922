// Binary lane-pixel extraction: an HLS color cue and a horizontal-gradient
// cue, merged per the configured combine mode. The union default trades
// precision for recall; the windowed search downstream is the spatial filter
// that makes that trade safe.

use crate::types::{BinaryMask, ChannelSelect, CombineMode, ThresholdConfig};
use image::{imageops, GrayImage, RgbImage};
use tracing::debug;

#[derive(Debug)]
pub struct BinaryThresholder {
    config: ThresholdConfig,
}

impl BinaryThresholder {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// Build the lane-candidate mask for an undistorted frame.
    pub fn apply(&self, frame: &RgbImage) -> BinaryMask {
        let mask = match self.config.combine {
            CombineMode::ColorOnly => self.color_mask(frame),
            CombineMode::GradientOnly => self.gradient_mask(frame),
            CombineMode::ColorOrGradient => {
                combine(&self.color_mask(frame), &self.gradient_mask(frame), |a, b| {
                    a || b
                })
            }
            CombineMode::ColorAndGradient => {
                combine(&self.color_mask(frame), &self.gradient_mask(frame), |a, b| {
                    a && b
                })
            }
        };

        debug!(
            set = mask.count_set(),
            total = (mask.width() * mask.height()) as usize,
            "thresholded frame"
        );
        mask
    }

    /// Threshold one HLS channel.
    fn color_mask(&self, frame: &RgbImage) -> BinaryMask {
        let (w, h) = frame.dimensions();
        let mut mask = BinaryMask::new(w, h);
        let (lo, hi) = (self.config.color_thresh_min, self.config.color_thresh_max);

        for (x, y, px) in frame.enumerate_pixels() {
            let (_, l, s) = rgb_to_hls(px[0] as f32, px[1] as f32, px[2] as f32);
            let value = match self.config.channel_select {
                ChannelSelect::Lightness => l,
                ChannelSelect::Saturation => s,
            } as u8;
            if value >= lo && value <= hi {
                mask.set(x, y);
            }
        }
        mask
    }

    /// Threshold the rescaled absolute horizontal Sobel response. Lane
    /// markings are near-vertical, so the x-derivative is the signal.
    fn gradient_mask(&self, frame: &RgbImage) -> BinaryMask {
        let gray = imageops::grayscale(frame);
        let response = sobel_x_abs(&gray, self.config.sobel_kernel_size);

        let max = response.iter().copied().max().unwrap_or(0).max(1);
        let (w, h) = gray.dimensions();
        let mut mask = BinaryMask::new(w, h);
        let (lo, hi) = (
            self.config.gradient_thresh_min,
            self.config.gradient_thresh_max,
        );

        for y in 0..h {
            for x in 0..w {
                let scaled = (response[(y * w + x) as usize] as u64 * 255 / max as u64) as u8;
                if scaled >= lo && scaled <= hi {
                    mask.set(x, y);
                }
            }
        }
        mask
    }
}

fn combine(a: &BinaryMask, b: &BinaryMask, op: impl Fn(bool, bool) -> bool) -> BinaryMask {
    let (w, h) = (a.width(), a.height());
    let mut out = BinaryMask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if op(a.is_set(x, y), b.is_set(x, y)) {
                out.set(x, y);
            }
        }
    }
    out
}

/// Convert RGB to HLS.
/// Returns (H: 0-360, L: 0-255, S: 0-255).
#[inline]
pub fn rgb_to_hls(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r_n = r / 255.0;
    let g_n = g / 255.0;
    let b_n = b / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;
    let sum = max + min;

    let h = if delta < 1e-6 {
        0.0
    } else if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta) % 6.0)
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    let l_n = sum / 2.0;

    // S is delta over the headroom available at this lightness.
    let s_n = if delta < 1e-6 {
        0.0
    } else if l_n <= 0.5 {
        delta / sum
    } else {
        delta / (2.0 - sum)
    };

    (h, l_n * 255.0, s_n * 255.0)
}

/// Absolute horizontal Sobel response with a binomial aperture of odd size.
/// Borders are handled by clamping the sample index.
fn sobel_x_abs(gray: &GrayImage, ksize: usize) -> Vec<u32> {
    let ksize = if ksize % 2 == 1 && (3..=7).contains(&ksize) {
        ksize
    } else {
        3
    };
    let smooth = binomial_row(ksize - 1);
    let deriv = derivative_kernel(ksize);
    let half = (ksize / 2) as i64;

    let (w, h) = gray.dimensions();
    let (wi, hi) = (w as i64, h as i64);

    // Horizontal derivative pass.
    let mut tmp = vec![0i64; (w * h) as usize];
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0i64;
            for (i, &k) in deriv.iter().enumerate() {
                let sx = (x + i as i64 - half).clamp(0, wi - 1);
                acc += k * gray.get_pixel(sx as u32, y as u32)[0] as i64;
            }
            tmp[(y * wi + x) as usize] = acc;
        }
    }

    // Vertical smoothing pass.
    let mut out = vec![0u32; (w * h) as usize];
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0i64;
            for (i, &k) in smooth.iter().enumerate() {
                let sy = (y + i as i64 - half).clamp(0, hi - 1);
                acc += k * tmp[(sy * wi + x) as usize];
            }
            out[(y * wi + x) as usize] = acc.unsigned_abs() as u32;
        }
    }
    out
}

/// Row of Pascal's triangle with `n + 1` entries.
fn binomial_row(n: usize) -> Vec<i64> {
    let mut row = vec![1i64];
    for _ in 0..n {
        let mut next = vec![1i64];
        for pair in row.windows(2) {
            next.push(pair[0] + pair[1]);
        }
        next.push(1);
        row = next;
    }
    row
}

/// Sobel derivative kernel of odd size: binomial smoothing convolved with
/// the central difference [-1, 0, 1].
fn derivative_kernel(ksize: usize) -> Vec<i64> {
    let base = binomial_row(ksize - 3);
    let diff = [-1i64, 0, 1];
    let mut out = vec![0i64; ksize];
    for (i, &a) in base.iter().enumerate() {
        for (j, &b) in diff.iter().enumerate() {
            out[i + j] += a * b;
        }
    }
    out
}
