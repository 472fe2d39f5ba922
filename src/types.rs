use image::GrayImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: ThresholdConfig,
    pub perspective: PerspectiveConfig,
    pub search: SearchConfig,
    pub fit: FitConfig,
    pub metric: MetricConfig,
    pub overlay: OverlayConfig,
    pub logging: LoggingConfig,
}

/// Which HLS channel feeds the color mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSelect {
    Lightness,
    Saturation,
}

/// How the color and gradient cues are merged into the final mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineMode {
    ColorOnly,
    GradientOnly,
    /// Union of both cues. Maximizes recall under shadow and pavement-color
    /// variation; the windowed search downstream absorbs the extra noise.
    ColorOrGradient,
    /// Intersection, for high-precision tuning on clean footage.
    ColorAndGradient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub channel_select: ChannelSelect,
    pub color_thresh_min: u8,
    pub color_thresh_max: u8,
    /// Odd Sobel aperture: 3, 5 or 7.
    pub sobel_kernel_size: usize,
    pub gradient_thresh_min: u8,
    pub gradient_thresh_max: u8,
    pub combine: CombineMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Camera-view corners of a known-straight lane segment, ordered
    /// bottom-left, top-left, top-right, bottom-right.
    pub src_points: [[f64; 2]; 4],
    /// Horizontal inset of the rectified lane rectangle from the image edges.
    pub dst_offset_px: f64,
    /// Explicit destination corners; overrides `dst_offset_px` when set.
    pub dst_points: Option<[[f64; 2]; 4]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub num_bands: u32,
    pub window_half_width_px: u32,
    pub min_pixels_per_window: usize,
    /// A lane whose accumulated pixel set is smaller than this is invalid.
    pub min_lane_pixels: usize,
    /// Margin-search half-width around the prior frame's polynomial.
    pub margin_px: u32,
    /// How many consecutive frames a lost lane may be held before the
    /// output record stops reporting its last geometry.
    pub max_stale_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Fits with a larger pixel-space RMS residual are rejected.
    pub max_fit_rmse_px: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Meters per pixel along x in the rectified view (lane-width based).
    pub xm_per_px: f64,
    /// Meters per pixel along y in the rectified view (dash-length based).
    pub ym_per_px: f64,
    /// Ceiling for the reported curvature radius; near-straight fits
    /// saturate here instead of overflowing.
    pub max_curvature_radius_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Blend weight of the lane polygon layer.
    pub lane_alpha: f32,
    /// Integer upscale of the HUD glyphs.
    pub text_scale: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Single-channel lane-candidate mask. 0 is background; any nonzero value
/// counts as a candidate, so bilinear-warped copies stay meaningful.
#[derive(Debug, Clone)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    pub const ON: u8 = 255;

    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    pub fn from_gray(img: GrayImage) -> Self {
        Self(img)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[inline]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] != 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32) {
        self.0.get_pixel_mut(x, y)[0] = Self::ON;
    }

    pub fn count_set(&self) -> usize {
        self.0.pixels().filter(|p| p[0] != 0).count()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}

/// Pixels attributed to one lane boundary, tagged with whether the search
/// considered them sufficient evidence.
#[derive(Debug, Clone, Default)]
pub struct PixelSet {
    pub points: Vec<(u32, u32)>,
    pub valid: bool,
}

impl PixelSet {
    pub fn invalid() -> Self {
        Self {
            points: Vec::new(),
            valid: false,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Quadratic x = a·y² + b·y + c.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn eval(&self, y: f64) -> f64 {
        (self.a * y + self.b) * y + self.c
    }
}

/// One lane boundary's fitted geometry plus its temporal bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneLine {
    /// Coefficients in rectified pixel space.
    pub pixel: Quadratic,
    /// Coefficients after meters-per-pixel scaling.
    pub metric: Quadratic,
    pub valid: bool,
    /// Frames since the last successful fit. 0 means fresh.
    pub stale_frames: u32,
}

impl LaneLine {
    /// Accept a fresh fit, clearing any staleness.
    pub fn accept(&mut self, pixel: Quadratic, metric: Quadratic) {
        self.pixel = pixel;
        self.metric = metric;
        self.valid = true;
        self.stale_frames = 0;
    }
}

/// Cross-frame lane-tracking state. The caller owns it, threads it through
/// `process_frame` in strict stream order, and may reset it to reprocess a
/// stream from scratch.
#[derive(Debug, Clone, Default)]
pub struct LaneState {
    pub left: LaneLine,
    pub right: LaneLine,
    pub frame_index: u64,
}

impl LaneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn both_valid(&self) -> bool {
        self.left.valid && self.right.valid
    }
}

/// Per-frame structured result for downstream consumers.
///
/// `vehicle_offset_m` is positive when the vehicle center sits to the RIGHT
/// of the lane midpoint. When `lanes_valid` is false the geometry fields are
/// zeroed rather than stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameRecord {
    pub left_curvature_m: f64,
    pub right_curvature_m: f64,
    pub vehicle_offset_m: f64,
    pub lanes_valid: bool,
}
