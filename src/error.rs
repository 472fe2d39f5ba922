use thiserror::Error;

/// Session-fatal failures. Everything per-frame recoverable goes through
/// [`LaneFailure`] and the hold policy instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no camera calibration model supplied")]
    CalibrationMissing,
    #[error("perspective points are degenerate, homography is singular")]
    SingularHomography,
}

/// Per-lane, per-frame failure cause. Consumed by the temporal-hold policy;
/// never surfaced to the caller as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneFailure {
    /// The search produced too few pixels to trust.
    NotFound,
    /// Fewer than 3 distinct y values, or residuals beyond the gate.
    DegenerateFit,
    /// Left and right curves cross inside the evaluated range.
    NonPhysicalGeometry,
}

impl LaneFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneFailure::NotFound => "LANE_NOT_FOUND",
            LaneFailure::DegenerateFit => "DEGENERATE_FIT",
            LaneFailure::NonPhysicalGeometry => "NON_PHYSICAL_GEOMETRY",
        }
    }
}
