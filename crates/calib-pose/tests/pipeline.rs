use calib_pose::aruco::builtins::DICT_4X4_50;
use calib_pose::aruco::rotate_code_u64;
use calib_pose::core::{Distortion, GrayImage, Intrinsics};
use nalgebra::Point2;
use calib_pose::pipeline::{
    run_pipeline, FrameResult, IterSource, JsonLinesSink, MarkerPipeline, PipelineConfig,
};

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;
const CELL_PX: usize = 30;
const ORIGIN: (usize, usize) = (550, 270);
const MARKER_LENGTH: f64 = 0.07;

/// 4x4 marker with a one-cell black border, six cells of `CELL_PX` across.
/// Its outer edges sit at `ORIGIN - 0.5` and `ORIGIN + 179.5`.
fn render_frame(code: u64) -> GrayImage {
    let mut img = GrayImage::filled(WIDTH, HEIGHT, 255);
    let cells = 6;
    for cy in 0..cells {
        for cx in 0..cells {
            let border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
            let white = !border && (code >> ((cy - 1) * 4 + (cx - 1))) & 1 == 1;
            let value = if white { 255 } else { 0 };
            for yy in 0..CELL_PX {
                for xx in 0..CELL_PX {
                    img.put(ORIGIN.0 + cx * CELL_PX + xx, ORIGIN.1 + cy * CELL_PX + yy, value);
                }
            }
        }
    }
    img
}

fn camera() -> Intrinsics {
    Intrinsics::new(1280.0, 1280.0, 640.0, 360.0, Distortion::none()).expect("camera")
}

fn pipeline() -> MarkerPipeline {
    let mut config = PipelineConfig::default();
    config.identify.marker_length = MARKER_LENGTH;
    MarkerPipeline::new(camera(), DICT_4X4_50, config).expect("pipeline")
}

/// Depth at which a 180 px marker of `MARKER_LENGTH` appears under fx = 1280.
fn expected_depth() -> f64 {
    1280.0 * MARKER_LENGTH / (6 * CELL_PX) as f64
}

fn assert_single_marker(result: &FrameResult) {
    assert_eq!(result.markers.len(), 1, "{result:?}");
    let m = &result.markers[0];
    assert_eq!(m.marker.id, 0);

    let t = m.pose.translation;
    let z = expected_depth();
    assert!((t.z - z).abs() < 0.005, "z = {}", t.z);
    assert!(t.x.abs() < 0.002 && t.y.abs() < 0.002, "t = {t:?}");
    assert!(m.pose.reprojection_error < 1.0, "rms = {}", m.pose.reprojection_error);
}

#[test]
fn face_on_marker_gives_frontal_pose() {
    let frame = render_frame(DICT_4X4_50.codes[0]);
    let result = pipeline().process_frame(0, &frame.view());
    assert_single_marker(&result);

    let m = &result.markers[0];
    assert!(m.pose.rotation.angle().to_degrees() < 2.0);

    let report = m.report();
    assert_eq!(report.id, 0);
    assert!(!report.gimbal_lock);
    assert!((report.distance - expected_depth()).abs() < 0.005);
    for angle in report.euler_deg {
        assert!(angle.abs() < 2.0, "{:?}", report.euler_deg);
    }
}

#[test]
fn marker_rotated_in_plane_reports_quarter_turn_yaw() {
    let frame = render_frame(rotate_code_u64(DICT_4X4_50.codes[0], 4, 1));
    let result = pipeline().process_frame(0, &frame.view());
    assert_single_marker(&result);

    let [roll, pitch, yaw] = result.markers[0].report().euler_deg;
    assert!(roll.abs() < 2.0 && pitch.abs() < 2.0, "{roll} {pitch}");
    assert!((yaw.abs() - 90.0).abs() < 2.0, "yaw = {yaw}");
}

#[test]
fn frames_are_processed_independently_and_in_order() {
    let frames = vec![
        render_frame(DICT_4X4_50.codes[0]),
        GrayImage::filled(WIDTH, HEIGHT, 255),
        render_frame(DICT_4X4_50.codes[0]),
    ];
    let results = pipeline().process_frames(&frames);

    assert_eq!(results.len(), 3);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.frame_index, i);
    }
    assert_single_marker(&results[0]);
    assert!(results[1].markers.is_empty());
    assert_eq!(results[0].markers, results[2].markers);
}

#[test]
fn run_pipeline_stops_at_max_frames() {
    let frames = vec![
        render_frame(DICT_4X4_50.codes[0]),
        GrayImage::filled(WIDTH, HEIGHT, 255),
        render_frame(DICT_4X4_50.codes[0]),
    ];
    let pipeline = pipeline();

    let mut sink: Vec<FrameResult> = Vec::new();
    let mut source = IterSource(frames.clone().into_iter());
    let n = run_pipeline(&pipeline, &mut source, &mut sink, Some(2)).expect("run");
    assert_eq!(n, 2);
    assert_eq!(sink.len(), 2);
    assert_single_marker(&sink[0]);
    assert_eq!(sink[1].frame_index, 1);

    let mut all: Vec<FrameResult> = Vec::new();
    let n = run_pipeline(&pipeline, &mut IterSource(frames.into_iter()), &mut all, None)
        .expect("run");
    assert_eq!(n, 3);
}

#[test]
fn json_lines_sink_writes_one_object_per_frame() {
    let frames = vec![
        render_frame(DICT_4X4_50.codes[0]),
        GrayImage::filled(WIDTH, HEIGHT, 255),
    ];
    let mut sink = JsonLinesSink::new(Vec::new());
    run_pipeline(&pipeline(), &mut IterSource(frames.into_iter()), &mut sink, None)
        .expect("run");

    let text = String::from_utf8(sink.into_inner()).expect("utf8");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame_index"], 0);
    assert_eq!(lines[0]["markers"][0]["id"], 0);
    assert!(lines[0]["markers"][0]["position"][2].as_f64().expect("z") > 0.4);
    assert_eq!(lines[1]["markers"].as_array().map(Vec::len), Some(0));
}

#[test]
fn frame_undistortion_without_distortion_keeps_the_pose() {
    let frame = render_frame(DICT_4X4_50.codes[0]);
    let pipeline = pipeline().with_frame_undistortion(WIDTH, HEIGHT);
    assert_single_marker(&pipeline.process_frame(0, &frame.view()));

    // Frames of another size skip the remap and are searched as captured.
    let small = GrayImage::filled(640, 480, 255);
    assert!(pipeline.process_frame(1, &small.view()).markers.is_empty());
}

/// Barrel lens with the same pinhole part as `camera()`.
fn barrel_camera() -> Intrinsics {
    let distortion = Distortion {
        k1: -0.3,
        k2: 0.1,
        ..Distortion::default()
    };
    Intrinsics::new(1280.0, 1280.0, 640.0, 360.0, distortion).expect("camera")
}

/// The marker of `render_frame`, moved near the top-left corner and imaged
/// through `lens`. Only the region that can hold the marker is evaluated.
fn render_distorted_frame(code: u64, origin: (f64, f64), lens: &Intrinsics) -> GrayImage {
    let mut img = GrayImage::filled(WIDTH, HEIGHT, 255);
    let cells = 0.0..6.0;
    for y in 0..360 {
        for x in 0..400 {
            let ideal = lens.undistort_pixel(Point2::new(x as f64, y as f64));
            let u = (ideal.x - origin.0 + 0.5) / CELL_PX as f64;
            let v = (ideal.y - origin.1 + 0.5) / CELL_PX as f64;
            if !cells.contains(&u) || !cells.contains(&v) {
                continue;
            }
            let (cx, cy) = (u as usize, v as usize);
            let border = cx == 0 || cy == 0 || cx == 5 || cy == 5;
            let white = !border && (code >> ((cy - 1) * 4 + (cx - 1))) & 1 == 1;
            if !white {
                img.put(x, y, 0);
            }
        }
    }
    img
}

#[test]
fn frame_undistortion_recovers_pose_through_a_barrel_lens() {
    let lens = barrel_camera();
    let origin = (100.0, 60.0);
    let frame = render_distorted_frame(DICT_4X4_50.codes[0], origin, &lens);

    let mut config = PipelineConfig::default();
    config.identify.marker_length = MARKER_LENGTH;
    let pipeline = MarkerPipeline::new(lens, DICT_4X4_50, config)
        .expect("pipeline")
        .with_frame_undistortion(WIDTH, HEIGHT);
    let result = pipeline.process_frame(0, &frame.view());

    assert_eq!(result.markers.len(), 1, "{result:?}");
    let m = &result.markers[0];
    assert_eq!(m.marker.id, 0);

    // Marker centre in the ideal image, back-projected at the expected depth.
    let z = expected_depth();
    let centre = (origin.0 + 89.5, origin.1 + 89.5);
    let t = m.pose.translation;
    assert!((t.z - z).abs() < 0.005, "z = {}", t.z);
    assert!((t.x - (centre.0 - 640.0) / 1280.0 * z).abs() < 0.003, "t = {t:?}");
    assert!((t.y - (centre.1 - 360.0) / 1280.0 * z).abs() < 0.003, "t = {t:?}");
    assert!(m.pose.rotation.angle().to_degrees() < 3.0);
    assert!(m.pose.reprojection_error < 1.0, "rms = {}", m.pose.reprojection_error);
}
