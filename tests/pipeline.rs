// End-to-end checks on synthetic camera frames: straight-lane geometry,
// search-mode selection across frames, the temporal-hold policy, and the
// offset sign convention.

use image::{Rgb, RgbImage};
use lane_finder::types::PerspectiveConfig;
use lane_finder::{
    CameraModel, Config, FrameOutput, LanePipeline, LaneState, PerspectiveMap, SearchMode,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

const PAVEMENT: Rgb<u8> = Rgb([105, 105, 105]);
const MARKING: Rgb<u8> = Rgb([235, 205, 0]);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("lane_finder=debug")
        .try_init();
}

/// Paint a camera-view frame whose markings rectify to vertical stripes at
/// the given bird's-eye x positions. Built by mapping every camera pixel
/// into the rectified plane and testing against the stripe spans, so the
/// frame is exact with respect to the session homography.
fn camera_frame_with_stripes(map: &PerspectiveMap, stripe_xs: &[f64]) -> RgbImage {
    let half_width = 12.0;
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let mapped = map
            .map_points_forward(&[[x as f64, y as f64]])
            .expect("finite mapping");
        let [bx, by] = mapped[0];
        let on_road = by >= 0.0 && by < HEIGHT as f64;
        if on_road && stripe_xs.iter().any(|&sx| (bx - sx).abs() <= half_width) {
            MARKING
        } else {
            PAVEMENT
        }
    })
}

fn blank_frame() -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, PAVEMENT)
}

fn pipeline() -> LanePipeline {
    init_logging();
    LanePipeline::new(
        Config::default(),
        Some(CameraModel::identity(WIDTH, HEIGHT)),
    )
    .unwrap()
}

fn session_map() -> PerspectiveMap {
    PerspectiveMap::from_config(&PerspectiveConfig::default(), WIDTH, HEIGHT).unwrap()
}

#[test]
fn straight_lane_first_frame() {
    let pipeline = pipeline();
    let map = session_map();
    let frame = camera_frame_with_stripes(&map, &[300.0, 980.0]);

    let mut state = LaneState::new();
    let out = pipeline.process_frame(&frame, &mut state);

    assert_eq!(out.mode, SearchMode::SlidingWindow);
    assert!(out.record.lanes_valid);
    // Straight markings: curvature saturates near the configured ceiling.
    assert!(out.record.left_curvature_m >= 5_000.0);
    assert!(out.record.right_curvature_m >= 5_000.0);
    // Lane midpoint coincides with the image center.
    assert!(
        out.record.vehicle_offset_m.abs() < 0.05,
        "offset {}",
        out.record.vehicle_offset_m
    );
    // Fitted curve positions match the synthetic stripes.
    assert!((state.left.pixel.c - 300.0).abs() < 6.0, "{}", state.left.pixel.c);
    assert!((state.right.pixel.c - 980.0).abs() < 6.0, "{}", state.right.pixel.c);
}

#[test]
fn second_frame_switches_to_margin_search() {
    let pipeline = pipeline();
    let map = session_map();
    let frame = camera_frame_with_stripes(&map, &[300.0, 980.0]);

    let mut state = LaneState::new();
    let first = pipeline.process_frame(&frame, &mut state);
    let second = pipeline.process_frame(&frame, &mut state);

    assert_eq!(first.mode, SearchMode::SlidingWindow);
    assert_eq!(second.mode, SearchMode::MarginSearch);
    assert!(second.record.lanes_valid);
    assert_eq!(state.frame_index, 2);
    assert!((first.record.vehicle_offset_m - second.record.vehicle_offset_m).abs() < 0.02);
}

#[test]
fn hold_policy_repeats_then_expires() {
    let pipeline = pipeline();
    let map = session_map();
    let good = camera_frame_with_stripes(&map, &[300.0, 980.0]);
    let blank = blank_frame();

    let mut state = LaneState::new();
    let baseline = pipeline.process_frame(&good, &mut state).record;
    assert!(baseline.lanes_valid);

    // max_stale_frames = 5: five lost frames are held at the baseline.
    for held in 0..5 {
        let out = pipeline.process_frame(&blank, &mut state);
        assert_eq!(
            out.record, baseline,
            "held frame {held} must repeat the last good record"
        );
    }

    // The sixth lost frame exceeds the budget.
    let expired = pipeline.process_frame(&blank, &mut state);
    assert!(!expired.record.lanes_valid);
    assert_eq!(expired.record.left_curvature_m, 0.0);
    assert_eq!(expired.record.vehicle_offset_m, 0.0);

    // With no valid prior the search falls back to a full rescan.
    let after = pipeline.process_frame(&blank, &mut state);
    assert_eq!(after.mode, SearchMode::SlidingWindow);
    assert!(!after.record.lanes_valid);
}

#[test]
fn recovery_after_expiry() {
    let pipeline = pipeline();
    let map = session_map();
    let good = camera_frame_with_stripes(&map, &[300.0, 980.0]);
    let blank = blank_frame();

    let mut state = LaneState::new();
    pipeline.process_frame(&good, &mut state);
    for _ in 0..6 {
        pipeline.process_frame(&blank, &mut state);
    }
    assert!(!state.both_valid());

    let recovered = pipeline.process_frame(&good, &mut state);
    assert_eq!(recovered.mode, SearchMode::SlidingWindow);
    assert!(recovered.record.lanes_valid);
    assert_eq!(state.left.stale_frames, 0);
}

#[test]
fn lane_shifted_left_reports_positive_offset() {
    // Both stripes 40 px left of center: the vehicle sits right of the lane
    // midpoint, so the offset must come out positive.
    let pipeline = pipeline();
    let map = session_map();
    let frame = camera_frame_with_stripes(&map, &[260.0, 940.0]);

    let mut state = LaneState::new();
    let out = pipeline.process_frame(&frame, &mut state);

    assert!(out.record.lanes_valid);
    let expected = 40.0 * 3.7 / 700.0;
    assert!(
        (out.record.vehicle_offset_m - expected).abs() < 0.05,
        "offset {} expected about {}",
        out.record.vehicle_offset_m,
        expected
    );
}

#[test]
fn stream_yields_one_output_per_frame() {
    let pipeline = pipeline();
    let map = session_map();
    let good = camera_frame_with_stripes(&map, &[300.0, 980.0]);

    let frames = vec![good.clone(), blank_frame(), good];
    let mut state = LaneState::new();
    let outputs: Vec<FrameOutput> = pipeline.process_stream(frames, &mut state).collect();

    assert_eq!(outputs.len(), 3);
    assert_eq!(state.frame_index, 3);
    assert!(outputs.iter().all(|o| o.record.lanes_valid));
    // The lost middle frame was held, not dropped.
    assert_eq!(outputs[0].record, outputs[1].record);
}

#[test]
fn annotated_frame_keeps_input_dimensions() {
    let pipeline = pipeline();
    let map = session_map();
    let frame = camera_frame_with_stripes(&map, &[300.0, 980.0]);

    let mut state = LaneState::new();
    let out = pipeline.process_frame(&frame, &mut state);
    assert_eq!(out.annotated.dimensions(), (WIDTH, HEIGHT));
}
