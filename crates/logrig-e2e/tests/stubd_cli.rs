//! Integration tests for the `logrig-stubd` entry point.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn help_succeeds() {
    let mut command = cargo_bin_cmd!("logrig-stubd");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("--cfgfile"));
}

#[test]
fn missing_configuration_flag_exits_with_failure() {
    let mut command = cargo_bin_cmd!("logrig-stubd");
    command.arg("--foreground");
    command.assert().failure().stderr(contains("--cfgfile"));
}

#[test]
fn unreadable_configuration_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut command = cargo_bin_cmd!("logrig-stubd");
    command.arg(format!("--cfgfile={}", dir.path().join("absent.conf").display()));
    command
        .assert()
        .failure()
        .stderr(contains("failed to read configuration"));
}

#[test]
fn malformed_configuration_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("broken.conf");
    fs::write(&config, "@version: 4.0\nsource s1 { file(\"/tmp/in\" };\n").expect("write");
    let mut command = cargo_bin_cmd!("logrig-stubd");
    command.arg(format!("--cfgfile={}", config.display()));
    command
        .assert()
        .failure()
        .stderr(contains("error parsing configuration"));
}
