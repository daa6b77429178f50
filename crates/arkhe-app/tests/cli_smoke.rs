use std::fs;
use std::process::Command;

use serde_json::Value;

#[test]
fn headless_run_writes_report_and_snapshots() {
    let dir = tempfile::tempdir().expect("temp dir");
    let report_path = dir.path().join("report.json");
    let png_dir = dir.path().join("frames");

    let status = Command::new(env!("CARGO_BIN_EXE_arkhe-app"))
        .args(["--view", "particle-field,radar", "--frames", "8"])
        .args(["--width", "96", "--height", "64", "--seed", "11"])
        .arg("--report")
        .arg(&report_path)
        .arg("--output-dir")
        .arg(&png_dir)
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run arkhe-app binary");
    assert!(status.success(), "headless run failed");

    let report: Value =
        serde_json::from_str(&fs::read_to_string(&report_path).expect("report")).expect("json");
    assert_eq!(report["frames"], 8);
    let panels = report["dashboard"]["panels"].as_array().expect("panels");
    assert_eq!(panels.len(), 2);
    for panel in panels {
        assert_eq!(panel["stats"]["frames_rendered"], 8);
        assert_eq!(panel["width"], 96);
    }

    let pngs = fs::read_dir(&png_dir).expect("png dir").count();
    assert_eq!(pngs, 2);
}

#[test]
fn env_overrides_and_bad_config_fail_cleanly() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_path = dir.path().join("panel.json");
    fs::write(&config_path, r#"{"view":"torus","entity_count":5,"projection":null}"#)
        .expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_arkhe-app"))
        .env("ARKHE_CONFIG", &config_path)
        .env("ARKHE_FRAMES", "2")
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run arkhe-app binary");
    assert!(!status.success(), "torus without projection must be rejected");
}

fn report_for(args: &[&str]) -> Value {
    let dir = tempfile::tempdir().expect("temp dir");
    let report_path = dir.path().join("report.json");
    let status = Command::new(env!("CARGO_BIN_EXE_arkhe-app"))
        .args(["--frames", "2", "--width", "64", "--height", "48", "--seed", "3"])
        .args(args)
        .arg("--report")
        .arg(&report_path)
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run arkhe-app binary");
    assert!(status.success(), "run with {args:?} failed");
    serde_json::from_str(&fs::read_to_string(&report_path).expect("report")).expect("json")
}

fn panel_modes(report: &Value) -> Vec<String> {
    report["dashboard"]["panels"]
        .as_array()
        .expect("panels")
        .iter()
        .map(|panel| panel["mode"].as_str().expect("mode").to_owned())
        .collect()
}

#[test]
fn views_run_their_preset_mode_unless_overridden() {
    let presets = report_for(&["--view", "waves,torus,lattice"]);
    assert_eq!(panel_modes(&presets), ["resonance", "vortex", "converge"]);

    let forced = report_for(&["--view", "waves,torus", "--mode", "scatter"]);
    assert_eq!(panel_modes(&forced), ["scatter", "scatter"]);
}

#[test]
fn oversized_dimensions_are_rejected() {
    for (flag, value) in [("--width", "70000"), ("--height", "0")] {
        let output = Command::new(env!("CARGO_BIN_EXE_arkhe-app"))
            .args(["--frames", "1", flag, value])
            .env("RUST_LOG", "off")
            .output()
            .expect("failed to run arkhe-app binary");
        assert!(!output.status.success(), "{flag} {value} must be rejected");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains(flag), "unexpected error output: {stderr}");
    }
}
