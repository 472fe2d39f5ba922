// Forward/inverse homography between camera view and bird's-eye view.
// Estimated once per camera mount from four point correspondences chosen so
// that straight lane segments become parallel verticals in the rectified
// view; pure geometric transform afterwards.

use crate::error::PipelineError;
use crate::types::{BinaryMask, PerspectiveConfig};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use nalgebra::{DMatrix, Matrix3, Vector3};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct PerspectiveMap {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
    fwd_proj: Projection,
    inv_proj: Projection,
}

impl PerspectiveMap {
    /// Build the mapper from a config section and the frame size the source
    /// points were picked on.
    pub fn from_config(
        config: &PerspectiveConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        let dst = config.dst_points.unwrap_or_else(|| {
            let off = config.dst_offset_px;
            let (w, h) = (width as f64, height as f64);
            // Same corner order as the source: bottom-left, top-left,
            // top-right, bottom-right.
            [[off, h], [off, 0.0], [w - off, 0.0], [w - off, h]]
        });
        Self::from_points(&config.src_points, &dst)
    }

    pub fn from_points(
        src: &[[f64; 2]; 4],
        dst: &[[f64; 2]; 4],
    ) -> Result<Self, PipelineError> {
        let forward = dlt_homography(src, dst)?;

        // Four exact correspondences must reproject exactly; anything else
        // means the points were degenerate and the null vector is junk.
        let reprojected =
            apply_homography_points(&forward, src).ok_or(PipelineError::SingularHomography)?;
        for (r, d) in reprojected.iter().zip(dst.iter()) {
            if (r[0] - d[0]).abs() > 1e-3 || (r[1] - d[1]).abs() > 1e-3 {
                return Err(PipelineError::SingularHomography);
            }
        }

        let inverse = forward
            .try_inverse()
            .ok_or(PipelineError::SingularHomography)?;

        let fwd_proj = projection_of(&forward).ok_or(PipelineError::SingularHomography)?;
        let inv_proj = projection_of(&inverse).ok_or(PipelineError::SingularHomography)?;

        Ok(Self {
            forward,
            inverse,
            fwd_proj,
            inv_proj,
        })
    }

    /// Camera view to bird's-eye view.
    pub fn warp_forward(&self, img: &RgbImage) -> RgbImage {
        warp(img, &self.fwd_proj, Interpolation::Bilinear, Rgb([0, 0, 0]))
    }

    /// Bird's-eye view back to camera view.
    pub fn warp_inverse(&self, img: &RgbImage) -> RgbImage {
        warp(img, &self.inv_proj, Interpolation::Bilinear, Rgb([0, 0, 0]))
    }

    /// Rectify a candidate mask. Bilinear resampling leaves intermediate
    /// values at region edges; any nonzero result still counts as set.
    pub fn warp_mask_forward(&self, mask: &BinaryMask) -> BinaryMask {
        BinaryMask::from_gray(warp(
            mask.as_gray(),
            &self.fwd_proj,
            Interpolation::Bilinear,
            image::Luma([0]),
        ))
    }

    pub fn warp_mask_inverse(&self, mask: &BinaryMask) -> BinaryMask {
        BinaryMask::from_gray(warp(
            mask.as_gray(),
            &self.inv_proj,
            Interpolation::Bilinear,
            image::Luma([0]),
        ))
    }

    pub fn map_points_forward(&self, pts: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
        apply_homography_points(&self.forward, pts)
    }

    pub fn map_points_inverse(&self, pts: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
        apply_homography_points(&self.inverse, pts)
    }
}

fn projection_of(m: &Matrix3<f64>) -> Option<Projection> {
    let mut coeffs = [0f32; 9];
    for r in 0..3 {
        for c in 0..3 {
            coeffs[r * 3 + c] = m[(r, c)] as f32;
        }
    }
    Projection::from_matrix(coeffs)
}

/// Estimate H such that dst ~ H · src from exactly four correspondences,
/// solved as the null vector of the stacked DLT system.
fn dlt_homography(
    src: &[[f64; 2]; 4],
    dst: &[[f64; 2]; 4],
) -> Result<Matrix3<f64>, PipelineError> {
    let mut a = DMatrix::<f64>::zeros(8, 9);

    for (i, (ps, pd)) in src.iter().zip(dst.iter()).enumerate() {
        let [x, y] = *ps;
        let [u, v] = *pd;

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(true, true);
    let v_t = svd.v_t.ok_or(PipelineError::SingularHomography)?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_mat = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_mat[(r, c)] = h[3 * r + c];
        }
    }

    let scale = h_mat[(2, 2)];
    if scale.abs() < EPS {
        return Err(PipelineError::SingularHomography);
    }
    h_mat /= scale;

    Ok(h_mat)
}

fn apply_homography_points(h: &Matrix3<f64>, pts: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    let mut out = Vec::with_capacity(pts.len());
    for &p in pts {
        let v = h * Vector3::new(p[0], p[1], 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        out.push([v[0] / w, v[1] / w]);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_map() -> PerspectiveMap {
        PerspectiveMap::from_config(&PerspectiveConfig::default(), 1280, 720).unwrap()
    }

    #[test]
    fn corners_map_to_destination_rectangle() {
        let map = default_map();
        let src = PerspectiveConfig::default().src_points;
        let mapped = map.map_points_forward(&src).unwrap();
        let expected = [[300.0, 720.0], [300.0, 0.0], [980.0, 0.0], [980.0, 720.0]];
        for (m, e) in mapped.iter().zip(expected.iter()) {
            assert!((m[0] - e[0]).abs() < 1e-6, "{m:?} vs {e:?}");
            assert!((m[1] - e[1]).abs() < 1e-6, "{m:?} vs {e:?}");
        }
    }

    #[test]
    fn round_trip_is_identity() {
        let map = default_map();
        let pts = [[640.0, 360.0], [123.0, 456.0], [1000.0, 700.0]];
        let there = map.map_points_forward(&pts).unwrap();
        let back = map.map_points_inverse(&there).unwrap();
        for (p, q) in pts.iter().zip(back.iter()) {
            assert!((p[0] - q[0]).abs() < 1e-6);
            assert!((p[1] - q[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn straight_lane_edges_become_vertical() {
        // The two source-point edges are straight lane markings; rectified
        // they must be constant-x within 2 px over their whole length.
        let map = default_map();
        let edges = [
            ([205.0, 720.0], [600.0, 445.0]),
            ([1105.0, 720.0], [685.0, 445.0]),
        ];
        for (bottom, top) in edges {
            let samples: Vec<[f64; 2]> = (0..=10)
                .map(|i| {
                    let t = i as f64 / 10.0;
                    [
                        bottom[0] + t * (top[0] - bottom[0]),
                        bottom[1] + t * (top[1] - bottom[1]),
                    ]
                })
                .collect();
            let mapped = map.map_points_forward(&samples).unwrap();
            let x0 = mapped[0][0];
            for m in &mapped {
                assert!(
                    (m[0] - x0).abs() <= 2.0,
                    "rectified edge bowed: {} vs {}",
                    m[0],
                    x0
                );
            }
        }
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(PerspectiveMap::from_points(&src, &dst).is_err());
    }

    #[test]
    fn warp_round_trip_preserves_center_block() {
        // A block at the middle of the rectified region should survive a
        // forward-then-inverse warp approximately intact.
        let mut img = RgbImage::new(1280, 720);
        for y in 600..650 {
            for x in 620..660 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let map = default_map();
        let round = map.warp_inverse(&map.warp_forward(&img));
        // Interpolation softens edges; check the block core is still bright.
        assert!(round.get_pixel(640, 625)[0] > 200);
    }
}
