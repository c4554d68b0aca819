//! Shared fixtures for flagmerge integration tests
//!
//! Feature flag documents live under `tests/fixtures/flags/` and are copied
//! into a scratch directory per test, since a merge run writes its artifact
//! next to the source.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use flagmerge::{ConfigTarget, EffectiveConfig, MergeRequest, Pipeline, Settings};
use serde_json::Value;
use tempfile::TempDir;

/// Directory holding the fixture documents
pub fn flags_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/flags")
}

/// Path to a named fixture document
pub fn fixture_path(name: &str) -> PathBuf {
    flags_dir().join(name)
}

/// Copy a fixture into `dir` under a new file name
pub fn install(dir: &Path, fixture: &str, as_name: &str) -> PathBuf {
    let dest = dir.join(as_name);
    fs::copy(fixture_path(fixture), &dest).expect("copy fixture");
    dest
}

/// Parse a fixture document as plain JSON
pub fn fixture_json(name: &str) -> Value {
    read_json(&fixture_path(name))
}

pub fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("read json");
    serde_json::from_str(&text).expect("parse json")
}

pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).expect("serialize")).expect("write json");
    path
}

pub fn scratch() -> TempDir {
    TempDir::new().expect("create temp dir")
}

/// Settings with builtin defaults only
pub fn default_settings() -> Settings {
    EffectiveConfig::build(None, None, None)
        .expect("builtin config")
        .settings
}

/// Settings with CLI-style JSON overrides on top of the defaults
pub fn settings_with(overrides: Value) -> Settings {
    EffectiveConfig::build(None, None, Some(overrides))
        .expect("config with overrides")
        .settings
}

pub fn pipeline(settings: Settings) -> Pipeline {
    Pipeline::new(settings).with_run_id("test-run")
}

pub fn target(configuration: &str) -> ConfigTarget {
    ConfigTarget {
        configuration: configuration.to_string(),
        environment: "staging".to_string(),
        profile: "feature-flags".to_string(),
    }
}

pub fn request(configuration: &str, source: PathBuf, force_create: bool) -> MergeRequest {
    MergeRequest {
        target: target(configuration),
        source,
        force_create,
        deployed: None,
    }
}
