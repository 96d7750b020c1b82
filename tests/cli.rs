//! Integration tests for top-level CLI behavior.

use std::path::Path;
use std::process::Command;

use serde_json::json;

use runlink::cassette::recorder::CassetteRecorder;
use runlink::documents::RawDocument;

fn run_runlink(args: &[&str]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_runlink");
    Command::new(bin)
        .args(args)
        .env_remove("RUNLINK_RECORD")
        .env_remove("RUNLINK_CONFIG")
        .env_remove("RUNLINK_CASSETTES")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run runlink binary")
}

/// Writes a two-frame run as a cassette plus a config pointing into `root`.
fn fixture(root: &Path, exit_status: &str) -> (String, String) {
    let raw = root.join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    for n in 0..2 {
        std::fs::write(raw.join(format!("scan12_{n:06}.tif")), format!("frame {n}")).unwrap();
    }

    let documents = vec![
        RawDocument::new(
            "start",
            json!({
                "uid": "c0ffee00-1234", "scan_id": 12, "sample_name": "sampleB",
                "username": "ops", "cycle": "2025-3", "data_session": "pass-42",
                "project_name": "gisaxs", "detectors": ["pil1M"]
            }),
        ),
        RawDocument::new(
            "resource",
            json!({
                "uid": "res-1", "spec": "AD_TIFF", "root": "/acquire", "resource_path": "raw",
                "resource_kwargs": {
                    "template": "%s%s_%6.6d.tif",
                    "filename": "scan12",
                    "frame_per_point": 1
                }
            }),
        ),
        RawDocument::new(
            "descriptor",
            json!({
                "uid": "desc",
                "name": "primary",
                "data_keys": {"pil1M_image": {"external": "FILESTORE:"}}
            }),
        ),
        RawDocument::new(
            "datum_page",
            json!({
                "resource": "res-1",
                "datum_id": ["res-1/0", "res-1/1"],
                "datum_kwargs": {"point_number": [0, 1]}
            }),
        ),
        RawDocument::new(
            "event_page",
            json!({
                "descriptor": "desc",
                "seq_num": [1, 2],
                "data": {"pil1M_image": ["res-1/0", "res-1/1"]}
            }),
        ),
        RawDocument::new(
            "stop",
            json!({
                "run_start": "c0ffee00-1234",
                "exit_status": exit_status,
                "num_events": {"primary": 2}
            }),
        ),
    ];
    let cassettes = root.join("cassettes");
    let mut recorder =
        CassetteRecorder::new(cassettes.join("scan12.cassette.yaml"), "scan12", "12");
    recorder.record(documents);
    recorder.finish().unwrap();

    let config = root.join("runlink.yaml");
    std::fs::write(
        &config,
        format!(
            "proposals_root: {}\nlinker:\n  analysis_templates: []\n  \
             root_map:\n    /acquire: {}\n",
            root.join("proposals").display(),
            root.display()
        ),
    )
    .unwrap();

    (config.display().to_string(), cassettes.display().to_string())
}

#[test]
fn help_lists_subcommands() {
    let output = run_runlink(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for sub in ["link", "validate", "export", "end-of-run"] {
        assert!(stdout.contains(sub), "missing {sub} in {stdout}");
    }
}

#[test]
fn invalid_subcommand_exits_with_error() {
    let output = run_runlink(&["nonsense"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn link_replays_cassette_and_creates_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    let (config, cassettes) = fixture(dir.path(), "success");

    let output = run_runlink(&["--config", &config, "--cassettes", &cassettes, "link", "12"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("complete (2 linked, 0 failed)"), "{stdout}");

    let link = dir
        .path()
        .join("proposals/2025-3/pass-42/projects/gisaxs/user_data/1M/sampleB_id12_000001_SAXS.tif");
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read_to_string(&link).unwrap(), "frame 1");
}

#[test]
fn dry_run_prints_plans_only() {
    let dir = tempfile::tempdir().unwrap();
    let (config, cassettes) = fixture(dir.path(), "success");

    let output = run_runlink(&[
        "--config",
        &config,
        "--cassettes",
        &cassettes,
        "link",
        "c0ffee00",
        "--dry-run",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("2 planned links"), "{stdout}");
    assert!(!dir.path().join("proposals").exists());
}

#[test]
fn validate_reports_aborted_run() {
    let dir = tempfile::tempdir().unwrap();
    let (config, cassettes) = fixture(dir.path(), "abort");

    let output = run_runlink(&["--config", &config, "--cassettes", &cassettes, "validate", "12"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("[FAIL] exit-status: run ended with abort"), "{stdout}");
    assert!(stdout.contains("[PASS] event-count: primary"), "{stdout}");
}

#[test]
fn end_of_run_from_stop_document() {
    let dir = tempfile::tempdir().unwrap();
    let (config, cassettes) = fixture(dir.path(), "success");
    let stop = dir.path().join("stop.json");
    std::fs::write(&stop, r#"{"run_start": "c0ffee00-1234", "exit_status": "success"}"#).unwrap();

    let output = run_runlink(&[
        "--config",
        &config,
        "--cassettes",
        &cassettes,
        "end-of-run",
        "--stop-document",
        stop.to_str().unwrap(),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("links complete (2 linked, 0 failed), no export"), "{stdout}");
}
