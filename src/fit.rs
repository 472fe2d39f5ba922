// Quadratic least squares for lane boundaries: x = a·y² + b·y + c, fitted
// once in rectified pixel space and once on meter-scaled coordinates.
// y is rescaled to [0, 1] before solving and the coefficients are mapped
// back afterwards, which keeps the normal equations well conditioned at
// full image heights.

use crate::error::LaneFailure;
use crate::types::{FitConfig, MetricConfig, PixelSet, Quadratic};
use std::collections::HashSet;
use tracing::debug;

/// A successful per-lane fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneFit {
    pub pixel: Quadratic,
    pub metric: Quadratic,
    /// RMS residual of the pixel-space fit, in pixels.
    pub rmse_px: f64,
    pub num_points: usize,
}

#[derive(Debug)]
pub struct PolynomialFitter {
    max_rmse_px: f64,
    xm_per_px: f64,
    ym_per_px: f64,
}

impl PolynomialFitter {
    pub fn new(fit: &FitConfig, metric: &MetricConfig) -> Self {
        Self {
            max_rmse_px: fit.max_fit_rmse_px,
            xm_per_px: metric.xm_per_px,
            ym_per_px: metric.ym_per_px,
        }
    }

    /// Fit one lane's pixel set. The set must span at least 3 distinct y
    /// values to be well posed; anything less is a degenerate fit and the
    /// caller's hold policy takes over.
    pub fn fit_lane(&self, pixels: &PixelSet) -> Result<LaneFit, LaneFailure> {
        if !pixels.valid || pixels.is_empty() {
            return Err(LaneFailure::NotFound);
        }

        let distinct_y: HashSet<u32> = pixels.points.iter().map(|&(_, y)| y).collect();
        if distinct_y.len() < 3 {
            return Err(LaneFailure::DegenerateFit);
        }

        let pixel_pts: Vec<(f64, f64)> = pixels
            .points
            .iter()
            .map(|&(x, y)| (x as f64, y as f64))
            .collect();
        let pixel = polyfit_quadratic(&pixel_pts).ok_or(LaneFailure::DegenerateFit)?;

        let rmse = rmse(&pixel_pts, &pixel);
        if rmse > self.max_rmse_px {
            debug!(
                rmse_px = rmse,
                limit_px = self.max_rmse_px,
                points = pixel_pts.len(),
                "fit rejected, residuals too large"
            );
            return Err(LaneFailure::DegenerateFit);
        }

        let metric_pts: Vec<(f64, f64)> = pixels
            .points
            .iter()
            .map(|&(x, y)| (x as f64 * self.xm_per_px, y as f64 * self.ym_per_px))
            .collect();
        let metric = polyfit_quadratic(&metric_pts).ok_or(LaneFailure::DegenerateFit)?;

        Ok(LaneFit {
            pixel,
            metric,
            rmse_px: rmse,
            num_points: pixel_pts.len(),
        })
    }
}

fn rmse(pts: &[(f64, f64)], q: &Quadratic) -> f64 {
    let sse: f64 = pts
        .iter()
        .map(|&(x, y)| {
            let r = x - q.eval(y);
            r * r
        })
        .sum();
    (sse / pts.len() as f64).sqrt()
}

/// Least-squares quadratic through the normal equations. Points are (x, y)
/// with y the independent variable.
pub fn polyfit_quadratic(pts: &[(f64, f64)]) -> Option<Quadratic> {
    if pts.len() < 3 {
        return None;
    }

    let y_scale = pts
        .iter()
        .map(|p| p.1.abs())
        .fold(f64::NEG_INFINITY, f64::max)
        .max(1.0);

    let n = pts.len() as f64;
    let s0: f64 = n;
    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    let mut s3 = 0.0f64;
    let mut s4 = 0.0f64;
    let mut sx0 = 0.0f64;
    let mut sx1 = 0.0f64;
    let mut sx2 = 0.0f64;

    for &(x, y) in pts {
        let yn = y / y_scale;
        let yn2 = yn * yn;

        s1 += yn;
        s2 += yn2;
        s3 += yn2 * yn;
        s4 += yn2 * yn2;
        sx0 += x;
        sx1 += x * yn;
        sx2 += x * yn2;
    }

    //   | s4 s3 s2 | | a |   | sx2 |
    //   | s3 s2 s1 | | b | = | sx1 |
    //   | s2 s1 s0 | | c |   | sx0 |
    let (a, b, c) = solve_3x3([s4, s3, s2, s3, s2, s1, s2, s1, s0], [sx2, sx1, sx0])?;

    // Undo the y rescale.
    Some(Quadratic::new(
        a / (y_scale * y_scale),
        b / y_scale,
        c,
    ))
}

/// Solve a 3×3 linear system Ax = b by Gaussian elimination with partial
/// pivoting. Matrix is row-major. Returns None if the system is singular.
fn solve_3x3(mat: [f64; 9], rhs: [f64; 3]) -> Option<(f64, f64, f64)> {
    let mut m = [
        [mat[0], mat[1], mat[2], rhs[0]],
        [mat[3], mat[4], mat[5], rhs[1]],
        [mat[6], mat[7], mat[8], rhs[2]],
    ];

    for col in 0..3 {
        let mut max_val = m[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..3 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }

        if max_val < 1e-12 {
            return None;
        }

        if max_row != col {
            m.swap(col, max_row);
        }

        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for j in col..4 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    if m[2][2].abs() < 1e-12 {
        return None;
    }
    let c = m[2][3] / m[2][2];
    let b = (m[1][3] - m[1][2] * c) / m[1][1];
    let a = (m[0][3] - m[0][2] * c - m[0][1] * b) / m[0][0];

    if a.is_finite() && b.is_finite() && c.is_finite() {
        Some((a, b, c))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitter() -> PolynomialFitter {
        PolynomialFitter::new(&FitConfig::default(), &MetricConfig::default())
    }

    fn set_on_curve(q: Quadratic, ys: impl Iterator<Item = u32>) -> PixelSet {
        PixelSet {
            points: ys.map(|y| (q.eval(y as f64).round() as u32, y)).collect(),
            valid: true,
        }
    }

    #[test]
    fn test_solve_3x3_identity() {
        let result = solve_3x3(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            [1.0, 2.0, 3.0],
        );
        let (a, b, c) = result.unwrap();
        assert!((a - 1.0).abs() < 1e-10);
        assert!((b - 2.0).abs() < 1e-10);
        assert!((c - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_3x3_singular() {
        let result = solve_3x3(
            [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            [1.0, 1.0, 2.0],
        );
        assert!(result.is_none());
    }

    #[test]
    fn recovers_known_parabola() {
        // x = 2y² + 3y + 100 sampled at every row of a 720-high mask.
        let truth = Quadratic::new(2.0, 3.0, 100.0);
        let pixels = PixelSet {
            points: (0..720)
                .map(|y| ((2 * y * y + 3 * y + 100) as u32, y as u32))
                .collect(),
            valid: true,
        };
        let fit = fitter().fit_lane(&pixels).unwrap();
        assert!((fit.pixel.a - truth.a).abs() / truth.a < 1e-3);
        assert!((fit.pixel.b - truth.b).abs() / truth.b < 1e-3);
        assert!((fit.pixel.c - truth.c).abs() / truth.c < 1e-3);
        assert!(fit.rmse_px < 1.0);
    }

    #[test]
    fn straight_line_fits_with_zero_curvature() {
        let pixels = set_on_curve(Quadratic::new(0.0, 0.0, 300.0), 0..720);
        let fit = fitter().fit_lane(&pixels).unwrap();
        assert!(fit.pixel.a.abs() < 1e-9);
        assert!((fit.pixel.c - 300.0).abs() < 1e-6);
    }

    #[test]
    fn metric_fit_scales_coefficients() {
        // A straight vertical line at x = 700 px sits at 3.7 m after the
        // default x scaling.
        let pixels = set_on_curve(Quadratic::new(0.0, 0.0, 700.0), 0..720);
        let fit = fitter().fit_lane(&pixels).unwrap();
        assert!((fit.metric.c - 3.7).abs() < 1e-6);
        assert!(fit.metric.a.abs() < 1e-9);
    }

    #[test]
    fn two_rows_is_degenerate() {
        let pixels = PixelSet {
            points: vec![(100, 10), (101, 10), (102, 11), (99, 11)],
            valid: true,
        };
        assert_eq!(
            fitter().fit_lane(&pixels),
            Err(LaneFailure::DegenerateFit)
        );
    }

    #[test]
    fn empty_set_is_not_found() {
        assert_eq!(
            fitter().fit_lane(&PixelSet::invalid()),
            Err(LaneFailure::NotFound)
        );
    }

    #[test]
    fn scattered_cloud_is_rejected_by_rmse_gate() {
        // Deterministic pseudo-noise spread over ±200 px, far past the gate.
        let points: Vec<(u32, u32)> = (0..720u32)
            .map(|y| {
                let jitter = ((y * 7919) % 401) as i64 - 200;
                ((500i64 + jitter).max(0) as u32, y)
            })
            .collect();
        let pixels = PixelSet {
            points,
            valid: true,
        };
        assert_eq!(
            fitter().fit_lane(&pixels),
            Err(LaneFailure::DegenerateFit)
        );
    }
}
