//! End-to-end CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_prints_the_crate_version() {
    Command::cargo_bin("mp4forge")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_defaults_succeeds() {
    Command::cargo_bin("mp4forge")
        .unwrap()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("defaults"));
}

#[test]
fn validate_rejects_broken_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    use std::io::Write;
    writeln!(file, "[video]\ncodecs = []").unwrap();

    Command::cargo_bin("mp4forge")
        .unwrap()
        .arg("validate")
        .arg(file.path())
        .assert()
        .failure();
}

#[test]
fn probe_missing_file_fails() {
    Command::cargo_bin("mp4forge")
        .unwrap()
        .args(["probe", "/nonexistent/file.mkv"])
        .assert()
        .failure();
}

#[test]
fn check_tools_reports_status() {
    Command::cargo_bin("mp4forge")
        .unwrap()
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}
