use std::error::Error;

use assert_cmd::cargo::cargo_bin_cmd;
use image::{ImageBuffer, Rgb};
use tempfile::tempdir;

#[test]
fn help_lists_the_model_flags() -> Result<(), Box<dyn Error>> {
    let output = cargo_bin_cmd!("faceattr").arg("--help").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--model-detect",
        "--model-landmark",
        "--model-align",
        "--model-attribute",
        "--images",
        "--gpus",
        "--pretrained",
        "--thresh",
        "--no-display",
    ] {
        assert!(stdout.contains(flag), "help is missing {flag}:\n{stdout}");
    }
    Ok(())
}

#[test]
fn missing_detector_model_fails_with_its_path() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image_path = work_dir.path().join("friends.png");
    ImageBuffer::from_pixel(16, 16, Rgb([200u8, 180, 160])).save(&image_path)?;

    let output = cargo_bin_cmd!("faceattr")
        .current_dir(work_dir.path())
        .arg("--model-detect")
        .arg("nowhere/detector.onnx")
        .arg("--images")
        .arg(&image_path)
        .arg("--no-display")
        .output()?;

    assert!(!output.status.success(), "run should fail without models");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("model file not found") && stderr.contains("detector.onnx"),
        "unexpected stderr:\n{stderr}"
    );
    assert!(!work_dir.path().join("result_attribute_v1.jpg").exists());
    assert!(!work_dir.path().join("align_result").exists());
    Ok(())
}

#[test]
fn invalid_gpu_list_is_rejected() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let output = cargo_bin_cmd!("faceattr")
        .current_dir(work_dir.path())
        .args(["--gpus", "first", "--no-display"])
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid GPU id"), "unexpected stderr:\n{stderr}");
    Ok(())
}
