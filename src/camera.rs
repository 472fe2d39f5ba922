// Camera model consumed from the offline calibration subsystem, plus the
// per-frame undistortion remap. Calibration solving itself happens outside
// this crate; the YAML artifact is the interface.

use anyhow::Result;
use image::{Rgb, RgbImage};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Pinhole intrinsics with optional skew.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl Intrinsics {
    #[inline]
    fn pixel_to_sensor(&self, pixel: Vector2<f64>) -> Vector2<f64> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vector2::new(sx, sy)
    }

    #[inline]
    fn sensor_to_pixel(&self, sensor: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * sensor.x + self.skew * sensor.y + self.cx,
            self.fy * sensor.y + self.cy,
        )
    }
}

/// Brown–Conrady radial/tangential distortion, forward direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
}

impl Distortion {
    #[inline]
    fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }
}

/// Immutable calibration artifact: intrinsic matrix, distortion vector and
/// the image size it was solved for. Owned by the pipeline for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    pub width: u32,
    pub height: u32,
}

impl CameraModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let model: CameraModel = serde_yaml::from_str(&contents)?;
        Ok(model)
    }

    /// A zero-distortion model for feeds that are already rectilinear.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            intrinsics: Intrinsics {
                fx: width.max(height) as f64,
                fy: width.max(height) as f64,
                cx: width as f64 / 2.0,
                cy: height as f64 / 2.0,
                skew: 0.0,
            },
            distortion: Distortion::default(),
            width,
            height,
        }
    }

    /// Remove lens distortion. Same dimensions in and out; pure.
    ///
    /// Inverse remap: each undistorted pixel is pushed through the forward
    /// distortion model to find where it lives in the raw frame, then
    /// bilinearly sampled there.
    pub fn undistort(&self, frame: &RgbImage) -> RgbImage {
        let (w, h) = frame.dimensions();
        let mut out = RgbImage::new(w, h);

        for v in 0..h {
            for u in 0..w {
                let sensor = self
                    .intrinsics
                    .pixel_to_sensor(Vector2::new(u as f64, v as f64));
                let distorted = self.distortion.distort(sensor);
                let src = self.intrinsics.sensor_to_pixel(distorted);
                out.put_pixel(u, v, sample_bilinear(frame, src.x, src.y));
            }
        }

        out
    }
}

/// Bilinear sample with black outside the frame.
fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let val = p00[c] as f64 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f64 * fx * (1.0 - fy)
            + p01[c] as f64 * (1.0 - fx) * fy
            + p11[c] as f64 * fx * fy;
        out[c] = val.round() as u8;
    }
    Rgb(out)
}
