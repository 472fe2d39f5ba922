//! Per-frame geometric lane-boundary detection for a forward-facing vehicle
//! camera.
//!
//! The pipeline chains undistortion, color/gradient thresholding, bird's-eye
//! rectification, a windowed pixel search, quadratic fitting and
//! curvature/offset estimation, and reports an annotated frame plus a
//! structured record per input frame. Cross-frame continuity lives in an
//! explicit [`LaneState`] value owned by the caller and threaded through
//! [`LanePipeline::process_frame`] in strict stream order.
//!
//! Camera calibration is consumed, never computed: a [`CameraModel`] comes
//! from the offline calibration subsystem as a YAML artifact.

pub mod camera;
mod config;
pub mod error;
pub mod fit;
pub mod lane_metrics;
pub mod overlay;
pub mod perspective;
pub mod pipeline;
pub mod search;
pub mod threshold;
pub mod types;

pub use camera::{CameraModel, Distortion, Intrinsics};
pub use error::{LaneFailure, PipelineError};
pub use perspective::PerspectiveMap;
pub use pipeline::{FrameOutput, LanePipeline};
pub use search::SearchMode;
pub use types::{Config, FrameRecord, LaneLine, LaneState, Quadratic};
