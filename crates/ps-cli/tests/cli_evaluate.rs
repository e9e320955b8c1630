use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_plotstack"))
}

fn repo_root() -> PathBuf {
    // crates/ps-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("plotstack_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn assert_artifact_contract(v: &serde_json::Value) {
    assert_eq!(v.get("schema_version").and_then(|x| x.as_str()), Some("plotstack_stacked_v0"));
    assert_eq!(v["meta"]["tool"], "plotstack");
    let edges = v.get("bin_edges").and_then(|x| x.as_array()).expect("bin_edges array");
    let n_bins = edges.len() - 1;

    let stacks = v.get("stacks").and_then(|x| x.as_array()).expect("stacks array");
    assert!(!stacks.is_empty(), "fixture has background processes");
    for key in ["total_y", "stat_err", "syst_err", "stat_syst_err"] {
        let arr = stacks[0].get(key).and_then(|x| x.as_array()).expect(key);
        assert_eq!(arr.len(), n_bins, "{key} length must match the binning");
    }
    let ratio = v.get("ratio").and_then(|x| x.as_array()).expect("ratio array");
    assert!(ratio.len() <= n_bins);
}

#[test]
fn evaluate_writes_artifact_to_file() {
    let input = fixture_path("plot_request.json");
    let out = tmp_path("artifact.json");
    let output = run(&[
        "evaluate",
        "--input",
        input.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
        "--threads",
        "1",
    ]);
    assert!(
        output.status.success(),
        "evaluate should succeed, stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let bytes = std::fs::read(&out).expect("output file should exist");
    let v: serde_json::Value = serde_json::from_slice(&bytes).expect("output should be JSON");
    assert_artifact_contract(&v);
    assert_eq!(v["plot"], "m_ll");
    assert_eq!(v["meta"]["parity_mode"]["threads"], 1);
    let _ = std::fs::remove_file(&out);
}

#[test]
fn evaluate_multiple_inputs_prints_array() {
    let input = fixture_path("plot_request.json");
    let input = input.to_str().unwrap();
    let output = run(&["evaluate", "--input", input, input, "--threads", "2"]);
    assert!(output.status.success(), "stderr={}", String::from_utf8_lossy(&output.stderr));

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout JSON");
    let plots = v.as_array().expect("several inputs give an array");
    assert_eq!(plots.len(), 2);
    for p in plots {
        assert_artifact_contract(p);
    }
}

#[test]
fn evaluate_missing_input_fails() {
    let output = run(&["evaluate", "--input", "/definitely/not/here.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read"), "stderr={stderr}");
}

#[test]
fn version_prints_crate_version() {
    let output = run(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("plotstack "), "stdout={stdout}");
}
