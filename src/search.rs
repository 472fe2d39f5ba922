// Lane-pixel search over the rectified candidate mask. Two named modes:
// a full sliding-window scan seeded by the bottom-half column histogram, and
// a cheaper margin search around the previous frame's polynomials. One guard
// picks the mode per frame: margin search iff both prior lines are valid.

use crate::types::{BinaryMask, LaneState, PixelSet, Quadratic, SearchConfig};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    SlidingWindow,
    MarginSearch,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::SlidingWindow => "SLIDING_WINDOW",
            SearchMode::MarginSearch => "MARGIN_SEARCH",
        }
    }
}

/// Window recentering trace, kept for diagnostics and tests. Band 0 is the
/// bottom of the image.
#[derive(Debug, Clone, Default)]
pub struct WindowTrace {
    pub left_centers: Vec<i64>,
    pub right_centers: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub left: PixelSet,
    pub right: PixelSet,
    pub mode: SearchMode,
    pub trace: Option<WindowTrace>,
}

#[derive(Debug)]
pub struct LaneSearcher {
    config: SearchConfig,
}

impl LaneSearcher {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn search(&self, mask: &BinaryMask, state: &LaneState) -> SearchResult {
        if state.both_valid() {
            let (left, right) = self.margin_search(mask, &state.left.pixel, &state.right.pixel);
            debug!(
                left = left.len(),
                right = right.len(),
                "margin search collected pixels"
            );
            SearchResult {
                left,
                right,
                mode: SearchMode::MarginSearch,
                trace: None,
            }
        } else {
            let (left, right, trace) = self.sliding_window(mask);
            debug!(
                left = left.len(),
                right = right.len(),
                "sliding-window search collected pixels"
            );
            SearchResult {
                left,
                right,
                mode: SearchMode::SlidingWindow,
                trace: Some(trace),
            }
        }
    }

    /// Full scan: histogram-seeded windows walked bottom-to-top, recentering
    /// on the mean x of the pixels found in each band.
    fn sliding_window(&self, mask: &BinaryMask) -> (PixelSet, PixelSet, WindowTrace) {
        let (w, h) = (mask.width(), mask.height());
        let rows = nonzero_by_row(mask);

        let hist = bottom_half_histogram(mask);
        let mid = (w / 2) as usize;
        let left_base = argmax(&hist[..mid]) as i64;
        let right_base = (mid + argmax(&hist[mid..])) as i64;

        let num_bands = self.config.num_bands.max(1);
        let band_height = (h / num_bands).max(1);
        let half_width = self.config.window_half_width_px as i64;

        let mut left_center = left_base;
        let mut right_center = right_base;
        let mut left_points: Vec<(u32, u32)> = Vec::new();
        let mut right_points: Vec<(u32, u32)> = Vec::new();
        let mut trace = WindowTrace::default();

        for band in 0..num_bands {
            let y_high = h - band * band_height;
            let y_low = h.saturating_sub((band + 1) * band_height);

            trace.left_centers.push(left_center);
            trace.right_centers.push(right_center);

            let mut left_sum = 0i64;
            let mut left_count = 0usize;
            let mut right_sum = 0i64;
            let mut right_count = 0usize;

            for y in y_low..y_high {
                for &x in &rows[y as usize] {
                    let xi = x as i64;
                    if (xi - left_center).abs() <= half_width {
                        left_points.push((x, y));
                        left_sum += xi;
                        left_count += 1;
                    }
                    if (xi - right_center).abs() <= half_width {
                        right_points.push((x, y));
                        right_sum += xi;
                        right_count += 1;
                    }
                }
            }

            // Recenter for the next band up only on solid evidence.
            if left_count >= self.config.min_pixels_per_window {
                left_center = left_sum / left_count as i64;
            }
            if right_count >= self.config.min_pixels_per_window {
                right_center = right_sum / right_count as i64;
            }
        }

        let left = self.tag(left_points);
        let right = self.tag(right_points);
        (left, right, trace)
    }

    /// Continuity mode: keep every candidate within the margin of the prior
    /// frame's curve, over the whole mask height. No histogram, no bands.
    fn margin_search(
        &self,
        mask: &BinaryMask,
        left_prior: &Quadratic,
        right_prior: &Quadratic,
    ) -> (PixelSet, PixelSet) {
        let (w, h) = (mask.width(), mask.height());
        let margin = self.config.margin_px as f64;

        let mut left_points: Vec<(u32, u32)> = Vec::new();
        let mut right_points: Vec<(u32, u32)> = Vec::new();

        for y in 0..h {
            let yf = y as f64;
            let left_x = left_prior.eval(yf);
            let right_x = right_prior.eval(yf);
            for x in 0..w {
                if !mask.is_set(x, y) {
                    continue;
                }
                let xf = x as f64;
                if (xf - left_x).abs() <= margin {
                    left_points.push((x, y));
                }
                if (xf - right_x).abs() <= margin {
                    right_points.push((x, y));
                }
            }
        }

        (self.tag(left_points), self.tag(right_points))
    }

    fn tag(&self, points: Vec<(u32, u32)>) -> PixelSet {
        let valid = points.len() >= self.config.min_lane_pixels;
        PixelSet { points, valid }
    }
}

/// Per-row x coordinates of set pixels.
fn nonzero_by_row(mask: &BinaryMask) -> Vec<Vec<u32>> {
    let (w, h) = (mask.width(), mask.height());
    let mut rows = vec![Vec::new(); h as usize];
    for y in 0..h {
        for x in 0..w {
            if mask.is_set(x, y) {
                rows[y as usize].push(x);
            }
        }
    }
    rows
}

/// Column-wise count of set pixels over the bottom half of the mask.
fn bottom_half_histogram(mask: &BinaryMask) -> Vec<u32> {
    let (w, h) = (mask.width(), mask.height());
    let mut hist = vec![0u32; w as usize];
    for y in h / 2..h {
        for x in 0..w {
            if mask.is_set(x, y) {
                hist[x as usize] += 1;
            }
        }
    }
    hist
}

fn argmax(values: &[u32]) -> usize {
    let mut best = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
