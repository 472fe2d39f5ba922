// Curvature radius and lateral offset from the fitted polynomials.
// Curvature uses the metric-space coefficients at the bottom of the image
// (closest road point to the vehicle); offset compares the lane midpoint to
// the image center, scaled to meters.

use crate::types::{MetricConfig, Quadratic};

#[derive(Debug)]
pub struct MetricsEstimator {
    xm_per_px: f64,
    ym_per_px: f64,
    max_radius_m: f64,
}

impl MetricsEstimator {
    pub fn new(config: &MetricConfig) -> Self {
        Self {
            xm_per_px: config.xm_per_px,
            ym_per_px: config.ym_per_px,
            max_radius_m: config.max_curvature_radius_m,
        }
    }

    /// R = (1 + (2·a·y + b)²)^1.5 / |2·a| at `y_eval_px` scaled to meters.
    ///
    /// A vanishing quadratic term means a straight segment; the radius
    /// saturates at the configured ceiling instead of overflowing.
    pub fn curvature_radius_m(&self, metric: &Quadratic, y_eval_px: f64) -> f64 {
        let y_m = y_eval_px * self.ym_per_px;
        let slope = 2.0 * metric.a * y_m + metric.b;
        let denom = (2.0 * metric.a).abs();
        if denom < 1e-12 {
            return self.max_radius_m;
        }
        let radius = (1.0 + slope * slope).powf(1.5) / denom;
        radius.min(self.max_radius_m)
    }

    /// Lateral offset of the vehicle center from the lane midpoint at the
    /// bottom of the image, in meters. Positive means the vehicle center is
    /// to the RIGHT of the lane midpoint.
    pub fn vehicle_offset_m(
        &self,
        left_pixel: &Quadratic,
        right_pixel: &Quadratic,
        width: u32,
        height: u32,
    ) -> f64 {
        let y = height as f64;
        let left_x = left_pixel.eval(y);
        let right_x = right_pixel.eval(y);
        let midpoint = (left_x + right_x) / 2.0;
        (width as f64 / 2.0 - midpoint) * self.xm_per_px
    }
}
