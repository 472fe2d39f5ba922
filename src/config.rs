use crate::types::{
    ChannelSelect, CombineMode, Config, FitConfig, LoggingConfig, MetricConfig, OverlayConfig,
    PerspectiveConfig, SearchConfig, ThresholdConfig,
};
use anyhow::Result;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            perspective: PerspectiveConfig::default(),
            search: SearchConfig::default(),
            fit: FitConfig::default(),
            metric: MetricConfig::default(),
            overlay: OverlayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            channel_select: ChannelSelect::Saturation,
            color_thresh_min: 170,
            color_thresh_max: 255,
            sobel_kernel_size: 3,
            gradient_thresh_min: 20,
            gradient_thresh_max: 100,
            combine: CombineMode::ColorOrGradient,
        }
    }
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        // Corners of a straight lane segment on the 1280x720 reference mount.
        Self {
            src_points: [
                [205.0, 720.0],
                [600.0, 445.0],
                [685.0, 445.0],
                [1105.0, 720.0],
            ],
            dst_offset_px: 300.0,
            dst_points: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_bands: 9,
            window_half_width_px: 100,
            min_pixels_per_window: 50,
            min_lane_pixels: 200,
            margin_px: 100,
            max_stale_frames: 5,
        }
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_fit_rmse_px: 30.0,
        }
    }
}

impl Default for MetricConfig {
    fn default() -> Self {
        // US-highway lane geometry: 3.7 m lane width over ~700 px and 30 m of
        // visible road over the 720 px rectified height.
        Self {
            xm_per_px: 3.7 / 700.0,
            ym_per_px: 30.0 / 720.0,
            max_curvature_radius_m: 10_000.0,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            lane_alpha: 0.3,
            text_scale: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
