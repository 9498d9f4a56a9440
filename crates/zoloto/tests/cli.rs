use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use zoloto::core::{CalibrationParameters, CameraIntrinsics};

fn zoloto() -> Command {
    Command::cargo_bin("zoloto").expect("binary")
}

fn render_marker_png(dir: &Path, id: u32) -> std::path::PathBuf {
    zoloto()
        .args(["markers", "--id", &id.to_string(), "--out-dir"])
        .arg(dir)
        .assert()
        .success();
    dir.join(format!("dict_4x4_50_{id}.png"))
}

#[test]
fn markers_renders_one_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = render_marker_png(dir.path(), 3);
    let img = image::open(&path).expect("png").to_luma8();
    assert_eq!(img.dimensions(), (160, 160));
}

#[test]
fn markers_renders_whole_dictionary() {
    let dir = tempfile::tempdir().expect("tempdir");
    zoloto()
        .args(["markers", "--marker-type", "DICT_4X4_100", "--cell-px", "4", "--out-dir"])
        .arg(dir.path())
        .assert()
        .success();
    let count = std::fs::read_dir(dir.path()).expect("dir").count();
    assert_eq!(count, 100);
}

#[test]
fn detect_prints_records_without_pose() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = render_marker_png(dir.path(), 3);
    zoloto()
        .args(["detect", "--marker-size", "50"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 3"))
        .stdout(predicate::str::contains("\"size\": 50"))
        .stdout(predicate::str::contains("rvec").not());
}

#[test]
fn detect_with_calibration_reports_pose() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = render_marker_png(dir.path(), 8);
    let calib_path = dir.path().join("calibration.json");
    CalibrationParameters::new(
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 80.0,
            cy: 80.0,
        },
        &[],
        (160, 160),
    )
    .write_json(&calib_path)
    .expect("write calibration");
    let annotated = dir.path().join("annotated.png");

    zoloto()
        .args(["detect", "--eager", "--calibration"])
        .arg(&calib_path)
        .arg("--annotated")
        .arg(&annotated)
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 8"))
        .stdout(predicate::str::contains("tvec"));
    assert!(annotated.exists());
}

#[test]
fn eager_detect_needs_calibration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = render_marker_png(dir.path(), 3);
    zoloto()
        .args(["detect", "--eager"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("calibration"));
}

#[test]
fn unknown_marker_type_is_rejected() {
    zoloto()
        .args(["markers", "--marker-type", "DICT_7X7_1000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown marker type"));
}
