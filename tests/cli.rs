//! CLI integration tests for the flagmerge binary.

mod fixtures;

use assert_cmd::Command;
use fixtures::*;
use predicates::prelude::*;
use serde_json::{json, Value};

fn cmd() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("flagmerge").expect("Failed to find flagmerge binary");
    cmd.arg("--no-host-config").env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ============================================================================
// Help and Version
// ============================================================================

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flagmerge"));
}

// ============================================================================
// merge
// ============================================================================

#[test]
fn test_merge_force_create_prints_report() {
    let dir = scratch();
    let source = install(dir.path(), "checkout.json", "checkout.json");

    let output = cmd()
        .current_dir(dir.path())
        .args(["merge", "--name", "checkout", "-e", "staging", "-p", "flags"])
        .arg("--source")
        .arg(&source)
        .arg("--force-create")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["schema_id"], json!("flagmerge/merge_report@1"));
    assert_eq!(report["decision"], json!("publish"));
    assert_eq!(report["reason"], json!("never_deployed"));
    assert_eq!(report["base"], json!("force_create"));
    assert_eq!(report["content_hash"].as_str().unwrap().len(), 64);
    assert!(dir.path().join("checkout.merged.json").exists());
}

#[test]
fn test_merge_without_base_exits_2() {
    let dir = scratch();
    let source = install(dir.path(), "checkout.json", "checkout.json");

    cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "-s"])
        .arg(&source)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("force-create"));

    assert!(!dir.path().join("checkout.merged.json").exists());
}

#[test]
fn test_merge_malformed_source_exits_3() {
    let dir = scratch();
    let source = install(dir.path(), "broken.json", "checkout.json");

    cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "--force-create", "-s"])
        .arg(&source)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("malformed"));
}

#[test]
fn test_merge_skips_when_deployed_hash_matches() {
    let dir = scratch();
    let source = install(dir.path(), "checkout.json", "checkout.json");

    let first = cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "--force-create", "-s"])
        .arg(&source)
        .output()
        .unwrap();
    let hash = stdout_json(&first)["content_hash"]
        .as_str()
        .unwrap()
        .to_uppercase();

    let report_path = dir.path().join("report.json");
    cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "-s"])
        .arg(&source)
        .args(["--deployed-version", "2", "--deployed-hash", &hash])
        .arg("--report")
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"decision\": \"skip\""));

    let report = read_json(&report_path);
    assert_eq!(report["reason"], json!("unchanged"));
    assert_eq!(report["previous_state"], json!("PUBLISHED"));
}

#[test]
fn test_merge_rejects_bad_deployed_hash() {
    let dir = scratch();
    let source = install(dir.path(), "checkout.json", "checkout.json");

    cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "-s"])
        .arg(&source)
        .args(["--deployed-version", "2", "--deployed-hash", "not-a-hash"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--deployed-hash"));
}

#[test]
fn test_merge_deletion_policy_flag() {
    let dir = scratch();
    install(dir.path(), "checkout.merged.json", "checkout.merged.json");
    let source = install(dir.path(), "checkout.json", "checkout.json");

    let output = cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags"])
        .args(["--deletion-policy", "mirror", "-s"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["deletion_policy"], json!("mirror"));
    assert_eq!(
        report["removed"],
        json!(["flags.legacy_banner", "values.legacy_banner"])
    );
}

// ============================================================================
// batch
// ============================================================================

#[test]
fn test_batch_exits_nonzero_on_partial_failure() {
    let dir = scratch();
    install(dir.path(), "checkout.json", "checkout.json");
    install(dir.path(), "broken.json", "broken.json");
    let summary_path = dir.path().join("summary.json");

    cmd()
        .current_dir(dir.path())
        .args(["batch", "-e", "staging", "-p", "flags", "--force-create", "-d"])
        .arg(dir.path())
        .arg("--report")
        .arg(&summary_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1 of 2 configurations failed"));

    let summary = read_json(&summary_path);
    assert_eq!(summary["total"], json!(2));
    assert_eq!(summary["published"], json!(1));
    assert_eq!(summary["failed"], json!(1));
}

// ============================================================================
// hash / check / config
// ============================================================================

#[test]
fn test_hash_is_stable_across_key_order() {
    let a = cmd()
        .arg("hash")
        .arg(fixture_path("checkout.json"))
        .output()
        .unwrap();
    let b = cmd()
        .arg("hash")
        .arg(fixture_path("checkout.reordered.json"))
        .output()
        .unwrap();

    assert!(a.status.success());
    assert_eq!(a.stdout, b.stdout);
    assert_eq!(String::from_utf8_lossy(&a.stdout).trim().len(), 64);
}

#[test]
fn test_hash_matches_artifact_for_other_schema_version() {
    let dir = scratch();
    let mut doc = fixture_json("checkout.json");
    doc["version"] = json!("2");
    let versioned = write_json(dir.path(), "checkout.v2.json", &doc);
    let source = install(dir.path(), "checkout.json", "checkout.json");

    let merged = cmd()
        .current_dir(dir.path())
        .args(["merge", "-n", "checkout", "-e", "staging", "-p", "flags", "--force-create", "-s"])
        .arg(&source)
        .output()
        .unwrap();
    let artifact_hash = stdout_json(&merged)["content_hash"].as_str().unwrap().to_string();

    let hashed = cmd().arg("hash").arg(&versioned).output().unwrap();
    assert!(hashed.status.success());
    assert_eq!(String::from_utf8_lossy(&hashed.stdout).trim(), artifact_hash);

    let state = write_json(
        dir.path(),
        "deployed.json",
        &json!({"version": 3, "hash": artifact_hash}),
    );
    let output = cmd()
        .args(["check", "--merged"])
        .arg(&versioned)
        .arg("--deployed-state")
        .arg(&state)
        .output()
        .unwrap();
    assert_eq!(stdout_json(&output)["decision"], json!("skip"));
}

#[test]
fn test_hash_missing_file_exits_4() {
    let dir = scratch();
    cmd()
        .arg("hash")
        .arg(dir.path().join("nope.json"))
        .assert()
        .code(4);
}

#[test]
fn test_check_with_deployed_state_file() {
    let dir = scratch();
    let merged = fixture_path("checkout.merged.json");

    let hashed = cmd().arg("hash").arg(&merged).output().unwrap();
    let hash = String::from_utf8_lossy(&hashed.stdout).trim().to_string();

    let state = write_json(
        dir.path(),
        "deployed.json",
        &json!({"version": 7, "hash": hash}),
    );
    let output = cmd()
        .args(["check", "--merged"])
        .arg(&merged)
        .arg("--deployed-state")
        .arg(&state)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["decision"], json!("skip"));

    let output = cmd()
        .args(["check", "--merged"])
        .arg(&merged)
        .output()
        .unwrap();
    let decision = stdout_json(&output);
    assert_eq!(decision["decision"], json!("publish"));
    assert_eq!(decision["reason"], json!("never_deployed"));
}

#[test]
fn test_config_shows_repo_layer() {
    let dir = scratch();
    std::fs::write(
        dir.path().join(".flagmerge.toml"),
        "[deletion]\npolicy = \"marker\"\nmarker = \"_delete\"\n",
    )
    .unwrap();

    let output = cmd().current_dir(dir.path()).arg("config").output().unwrap();
    assert!(output.status.success());

    let config = stdout_json(&output);
    assert_eq!(config["config"]["deletion"]["policy"], json!("marker"));
    assert_eq!(config["config"]["deletion"]["marker"], json!("_delete"));
    assert_eq!(config["sources"][1]["origin"], json!("repo"));
}

#[test]
fn test_missing_explicit_config_exits_1() {
    let dir = scratch();
    cmd()
        .current_dir(dir.path())
        .args(["--config", "missing.toml", "config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file not found"));
}
