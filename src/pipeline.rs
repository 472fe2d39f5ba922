// Per-frame orchestration: undistort → threshold → rectify → search → fit →
// metrics → overlay, with the temporal-hold policy applied to the carried
// LaneState. The caller owns the state and threads it in strict frame order;
// every input frame yields exactly one output record.

use crate::camera::CameraModel;
use crate::error::{LaneFailure, PipelineError};
use crate::fit::PolynomialFitter;
use crate::lane_metrics::MetricsEstimator;
use crate::overlay::OverlayRenderer;
use crate::perspective::PerspectiveMap;
use crate::search::{LaneSearcher, SearchMode};
use crate::threshold::BinaryThresholder;
use crate::types::{Config, FrameRecord, LaneLine, LaneState, Quadratic};
use image::RgbImage;
use tracing::{debug, info, warn};

/// Rows sampled when checking the non-crossing invariant.
const CROSSING_SAMPLES: u32 = 16;

#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub annotated: RgbImage,
    pub record: FrameRecord,
    /// Which search mode ran, for diagnostics.
    pub mode: SearchMode,
}

#[derive(Debug)]
pub struct LanePipeline {
    camera: CameraModel,
    map: PerspectiveMap,
    thresholder: BinaryThresholder,
    searcher: LaneSearcher,
    fitter: PolynomialFitter,
    metrics: MetricsEstimator,
    renderer: OverlayRenderer,
    max_stale_frames: u32,
}

impl LanePipeline {
    /// Build the session. The calibration model comes from the external
    /// calibration subsystem; without one no frame can be processed.
    pub fn new(config: Config, camera: Option<CameraModel>) -> Result<Self, PipelineError> {
        let camera = camera.ok_or(PipelineError::CalibrationMissing)?;
        let map = PerspectiveMap::from_config(&config.perspective, camera.width, camera.height)?;

        info!(
            width = camera.width,
            height = camera.height,
            "lane pipeline ready"
        );

        Ok(Self {
            map,
            thresholder: BinaryThresholder::new(config.threshold.clone()),
            searcher: LaneSearcher::new(config.search.clone()),
            fitter: PolynomialFitter::new(&config.fit, &config.metric),
            metrics: MetricsEstimator::new(&config.metric),
            renderer: OverlayRenderer::new(config.overlay.clone()),
            max_stale_frames: config.search.max_stale_frames,
            camera,
        })
    }

    /// Process one frame, updating the carried state in place.
    pub fn process_frame(&self, frame: &RgbImage, state: &mut LaneState) -> FrameOutput {
        let (width, height) = frame.dimensions();

        let undistorted = self.camera.undistort(frame);
        let mask = self.thresholder.apply(&undistorted);
        let rectified = self.map.warp_mask_forward(&mask);
        let search = self.searcher.search(&rectified, state);

        let left_fit = self.fitter.fit_lane(&search.left);
        let right_fit = self.fitter.fit_lane(&search.right);

        let mut next = state.clone();
        match &left_fit {
            Ok(fit) => next.left.accept(fit.pixel, fit.metric),
            Err(failure) => self.hold("left", &mut next.left, *failure),
        }
        match &right_fit {
            Ok(fit) => next.right.accept(fit.pixel, fit.metric),
            Err(failure) => self.hold("right", &mut next.right, *failure),
        }

        // Non-crossing invariant over the full evaluated range. A crossing
        // pair fails the whole frame: both lanes fall back to the prior
        // geometry under the hold policy.
        if next.both_valid() && curves_cross(&next.left.pixel, &next.right.pixel, height) {
            warn!(
                frame = state.frame_index,
                "detected lanes cross, holding previous geometry"
            );
            next = state.clone();
            self.hold("left", &mut next.left, LaneFailure::NonPhysicalGeometry);
            self.hold("right", &mut next.right, LaneFailure::NonPhysicalGeometry);
        }

        next.frame_index = state.frame_index + 1;
        *state = next;

        let record = self.record_for(state, width, height);
        let annotated = self.renderer.render(&undistorted, state, &self.map, &record);

        debug!(
            frame = state.frame_index,
            mode = search.mode.as_str(),
            lanes_valid = record.lanes_valid,
            "frame processed"
        );

        FrameOutput {
            annotated,
            record,
            mode: search.mode,
        }
    }

    /// Drive an ordered frame stream lazily, one output per input frame.
    pub fn process_stream<'a, I>(
        &'a self,
        frames: I,
        state: &'a mut LaneState,
    ) -> impl Iterator<Item = FrameOutput> + 'a
    where
        I: IntoIterator<Item = RgbImage>,
        I::IntoIter: 'a,
    {
        frames
            .into_iter()
            .map(move |frame| self.process_frame(&frame, &mut *state))
    }

    /// Temporal-hold policy: keep the last valid geometry for up to
    /// `max_stale_frames` frames, then stop reporting it.
    fn hold(&self, side: &str, line: &mut LaneLine, failure: LaneFailure) {
        if !line.valid {
            return;
        }
        line.stale_frames += 1;
        if line.stale_frames > self.max_stale_frames {
            line.valid = false;
            info!(
                side,
                cause = failure.as_str(),
                held_frames = self.max_stale_frames,
                "lane expired after staleness budget"
            );
        } else {
            debug!(
                side,
                cause = failure.as_str(),
                stale_frames = line.stale_frames,
                "lane held from previous frame"
            );
        }
    }

    fn record_for(&self, state: &LaneState, width: u32, height: u32) -> FrameRecord {
        if !state.both_valid() {
            return FrameRecord::default();
        }
        let y_bottom = height as f64;
        FrameRecord {
            left_curvature_m: self.metrics.curvature_radius_m(&state.left.metric, y_bottom),
            right_curvature_m: self
                .metrics
                .curvature_radius_m(&state.right.metric, y_bottom),
            vehicle_offset_m: self.metrics.vehicle_offset_m(
                &state.left.pixel,
                &state.right.pixel,
                width,
                height,
            ),
            lanes_valid: true,
        }
    }
}

/// True when the left curve reaches or passes the right curve anywhere on
/// the sampled y range.
fn curves_cross(left: &Quadratic, right: &Quadratic, height: u32) -> bool {
    (0..=CROSSING_SAMPLES).any(|i| {
        let y = height as f64 * i as f64 / CROSSING_SAMPLES as f64;
        left.eval(y) >= right.eval(y)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_calibration_is_fatal() {
        let err = LanePipeline::new(Config::default(), None).unwrap_err();
        assert!(matches!(err, PipelineError::CalibrationMissing));
    }

    #[test]
    fn crossing_detection_samples_full_range() {
        // Curves that only cross near the top of the image.
        let left = Quadratic::new(0.0, -1.0, 700.0);
        let right = Quadratic::new(0.0, 0.0, 400.0);
        assert!(curves_cross(&left, &right, 720));

        let left = Quadratic::new(0.0, 0.0, 300.0);
        let right = Quadratic::new(0.0, 0.0, 980.0);
        assert!(!curves_cross(&left, &right, 720));
    }

    #[test]
    fn hold_policy_expires_after_budget() {
        let pipeline =
            LanePipeline::new(Config::default(), Some(CameraModel::identity(1280, 720))).unwrap();
        let mut line = LaneLine {
            pixel: Quadratic::new(0.0, 0.0, 300.0),
            valid: true,
            stale_frames: 0,
            ..LaneLine::default()
        };

        for expected in 1..=5u32 {
            pipeline.hold("left", &mut line, LaneFailure::NotFound);
            assert!(line.valid, "line must survive held frame {expected}");
            assert_eq!(line.stale_frames, expected);
        }
        pipeline.hold("left", &mut line, LaneFailure::NotFound);
        assert!(!line.valid, "line must expire past the staleness budget");
    }
}
