#![cfg(feature = "cli")]

use assert_cmd::Command;
use calib_pose::io::{IntrinsicsRecord, IntrinsicsSource};
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Command {
    Command::cargo_bin("calib-pose").expect("binary")
}

#[test]
fn default_intrinsics_writes_a_record() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("camera.json");

    cli()
        .args(["default-intrinsics", "--width", "640", "--height", "480", "--out"])
        .arg(&out)
        .assert()
        .success();

    let rec = IntrinsicsRecord::load_json(&out).expect("record");
    assert_eq!(rec.source, IntrinsicsSource::Default);
    assert_eq!(rec.camera_matrix[0][0], 640.0);
    assert_eq!(rec.camera_matrix[1][2], 240.0);
    assert_eq!((rec.image_width, rec.image_height), (640, 480));
}

#[test]
fn log_level_flag_controls_stderr() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("camera.json");
    let run = |level: &str| {
        cli()
            .env_remove("RUST_LOG")
            .args(["--log-level", level, "default-intrinsics", "--width", "640", "--height", "480", "--out"])
            .arg(&out)
            .assert()
            .success()
    };

    run("info").stderr(predicate::str::contains("wrote"));
    run("error").stderr(predicate::str::is_empty());
}

#[test]
fn default_intrinsics_prints_to_stdout_without_out() {
    cli()
        .args(["default-intrinsics", "--width", "800", "--height", "600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source\": \"default\""));
}

#[test]
fn calibrate_without_usable_images_fails() {
    let dir = tempdir().expect("tempdir");
    cli()
        .args(["calibrate", "--cols", "9", "--rows", "6", "--out"])
        .arg(dir.path().join("camera.json"))
        .arg(dir.path().join("missing-1.png"))
        .arg(dir.path().join("missing-2.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("views"));
    assert!(!dir.path().join("camera.json").exists());
}

#[test]
fn unknown_dictionary_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let img = dir.path().join("blank.png");
    ::image::GrayImage::from_pixel(64, 48, ::image::Luma([255]))
        .save(&img)
        .expect("png");

    cli()
        .args(["detect", "--dictionary", "DICT_9X9_1"])
        .arg(&img)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown dictionary"));
}

#[test]
fn detect_prints_marker_poses_as_json_lines() {
    let dir = tempdir().expect("tempdir");
    let img_path = dir.path().join("frame.png");

    // Id 0 of the default dictionary, 30 px cells, at (550, 270) in a 1280x720 frame.
    let code: u64 = 0x4cad;
    let img = ::image::GrayImage::from_fn(1280, 720, |x, y| {
        let (x, y) = (x as i64 - 550, y as i64 - 270);
        if !(0..180).contains(&x) || !(0..180).contains(&y) {
            return ::image::Luma([255]);
        }
        let (cx, cy) = (x / 30, y / 30);
        let border = cx == 0 || cy == 0 || cx == 5 || cy == 5;
        let white = !border && (code >> ((cy - 1) * 4 + (cx - 1))) & 1 == 1;
        ::image::Luma([if white { 255 } else { 0 }])
    });
    img.save(&img_path).expect("png");

    let output = cli()
        .args(["--log-level", "warn", "detect", "--intrinsics"])
        .arg(dir.path().join("no-calibration.json"))
        .arg(&img_path)
        .arg(&img_path)
        .args(["--max-frames", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\":0"))
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).expect("utf8");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 1);
    let z = lines[0]["markers"][0]["position"][2].as_f64().expect("z");
    assert!((z - 1280.0 * 0.07 / 180.0).abs() < 0.005, "z = {z}");
}
