use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::{tempdir, TempDir};

const SINE: &str = "builtin:noisy-sine";

fn simcache(store: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simcache"))
        .arg("--store")
        .arg(store)
        .args(args)
        .env_remove("SIMCACHE_STORE")
        .output()
        .expect("spawn simcache")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "simcache failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).expect("utf8")
}

fn workspace() -> (TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    (dir, store)
}

#[test]
fn run_twice_yields_the_same_id() {
    let (dir, store) = workspace();
    let params = dir.path().join("params.yaml");
    fs::write(&params, "steps: 32\nnoise: 0.05\n").expect("params");
    let params = params.to_str().expect("utf8");

    let first = stdout(&simcache(&store, &["run", SINE, "--params", params, "--seed", "7", "--tag", "baseline"]));
    let second = stdout(&simcache(&store, &["run", SINE, "--params", params, "--seed", "7"]));
    assert_eq!(first.trim().len(), 64);
    assert_eq!(first, second);

    let other = stdout(&simcache(&store, &["run", SINE, "--params", params, "--seed", "8"]));
    assert_ne!(first, other);

    let listing = stdout(&simcache(&store, &["ls", "--tag", "baseline"]));
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(first.trim()));
    assert!(lines[0].ends_with("[baseline]"));
}

#[test]
fn negative_seeds_are_rejected_before_running() {
    let (_dir, store) = workspace();
    let output = simcache(&store, &["run", SINE, "--seed=-1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--seed"));
    let listing = stdout(&simcache(&store, &["ls"]));
    assert!(listing.is_empty());
}

#[test]
fn info_and_latest_print_the_record() {
    let (_dir, store) = workspace();
    let id = stdout(&simcache(&store, &["run", SINE, "--tag", "nightly"]));
    let id = id.trim();

    let info: Value = serde_json::from_str(&stdout(&simcache(&store, &["info", &id[..12]]))).expect("json");
    assert_eq!(info["fingerprint"], id);
    assert_eq!(info["tags"][0], "nightly");
    assert_eq!(info["arrays"]["x"]["shape"][0], 200);

    let latest: Value =
        serde_json::from_str(&stdout(&simcache(&store, &["latest", "--tag", "nightly"]))).expect("json");
    assert_eq!(latest["fingerprint"], id);

    let missing = simcache(&store, &["latest", "--tag", "weekly"]);
    assert!(!missing.status.success());
}

#[test]
fn export_writes_the_requested_format() {
    let (dir, store) = workspace();
    let id = stdout(&simcache(&store, &["run", SINE]));
    let dest = dir.path().join("out.csv");
    stdout(&simcache(&store, &["export", id.trim(), "--to", dest.to_str().expect("utf8")]));
    let body = fs::read_to_string(&dest).expect("csv");
    assert!(body.starts_with("array,index,value\n"));

    let dest = dir.path().join("out.dat");
    stdout(&simcache(&store, &[
        "export",
        id.trim(),
        "--to",
        dest.to_str().expect("utf8"),
        "--format",
        "json",
    ]));
    let doc: Value = serde_json::from_slice(&fs::read(&dest).expect("json")).expect("parse");
    assert_eq!(doc["fingerprint"], id.trim());
}

#[test]
fn export_of_a_missing_run_creates_nothing() {
    let (dir, store) = workspace();
    let dest = dir.path().join("out.dat");
    let output = simcache(&store, &["export", &"ab".repeat(32), "--to", dest.to_str().expect("utf8")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
    assert!(!dest.exists());
}

#[test]
fn sweep_rerun_computes_nothing() {
    let (dir, store) = workspace();
    let grid = dir.path().join("grid.yaml");
    fs::write(
        &grid,
        "params:\n  steps: [16, 32]\n  noise: [0.0, 0.1]\nseeds: [0, 1]\ntags: [grid]\n",
    )
    .expect("grid");
    let grid = grid.to_str().expect("utf8");

    let first = stdout(&simcache(&store, &["sweep", grid, SINE, "--parallelism", "2"]));
    assert_eq!(first.lines().filter(|line| line.starts_with("computed ")).count(), 8);
    assert!(first.trim_end().ends_with("computed=8 cached=0 failed=0"));

    let second = stdout(&simcache(&store, &["sweep", grid, SINE]));
    assert_eq!(second.lines().filter(|line| line.starts_with("cached ")).count(), 8);
    assert!(second.trim_end().ends_with("computed=0 cached=8 failed=0"));

    let listing = stdout(&simcache(&store, &["ls", "--tag", "grid"]));
    assert_eq!(listing.lines().count(), 8);
}

#[test]
fn doctor_reports_a_healthy_store() {
    let (_dir, store) = workspace();
    stdout(&simcache(&store, &["run", SINE]));
    let report: Value = serde_json::from_str(&stdout(&simcache(&store, &["doctor"]))).expect("json");
    assert_eq!(report["status"], "ok");
    assert_eq!(report["indexed"], 1);
    assert_eq!(report["units"], 1);
}

#[cfg(unix)]
#[test]
fn failing_entries_make_the_sweep_exit_non_zero() {
    let (dir, store) = workspace();
    let script = dir.path().join("flaky.sh");
    fs::write(
        &script,
        "input=$(cat)\ncase \"$input\" in\n  *'\"seed\":1'*) echo 'seed one diverged' >&2; exit 1;;\nesac\necho '{\"y\": [1.0]}'\n",
    )
    .expect("script");
    let grid = dir.path().join("grid.yaml");
    fs::write(&grid, "params:\n  a: [1]\nseeds: [0, 1, 2]\n").expect("grid");

    let output = simcache(&store, &[
        "sweep",
        grid.to_str().expect("utf8"),
        script.to_str().expect("utf8"),
        "--interpreter",
        "sh",
    ]);
    assert!(!output.status.success());
    let body = String::from_utf8_lossy(&output.stdout);
    assert!(body.contains("computed=2 cached=0 failed=1"), "{body}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("diverged"));
}
