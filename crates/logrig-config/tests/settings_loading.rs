//! Layered loading of harness settings through `ortho_config`.

use std::ffi::OsString;
use std::fs;
use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use logrig_config::{DEFAULT_STARTUP_TIMEOUT, HarnessSettings, LogFormat};
use ortho_config::OrthoConfig;

#[fixture]
fn config_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(error) => panic!("failed to create temporary directory: {error}"),
    }
}

fn args(extra: &[&str]) -> Vec<OsString> {
    std::iter::once("logrig")
        .chain(extra.iter().copied())
        .map(OsString::from)
        .collect()
}

#[rstest]
fn cli_flags_override_defaults() {
    let settings = HarnessSettings::load_from_iter(args(&[
        "--startup-timeout-ms",
        "750",
        "--log-format",
        "json",
    ]))
    .expect("settings should load");
    assert_eq!(settings.startup_timeout(), Duration::from_millis(750));
    assert_eq!(settings.log_format(), LogFormat::Json);
}

#[rstest]
fn configuration_file_values_are_applied(config_dir: TempDir) {
    let path = config_dir.path().join("logrig.toml");
    fs::write(
        &path,
        "reload_timeout_ms = 1234\nconfig_version = \"3.38\"\n",
    )
    .expect("write configuration");
    let path_arg = path.to_string_lossy().into_owned();
    let settings = HarnessSettings::load_from_iter(args(&["--config-path", &path_arg]))
        .expect("settings should load");
    assert_eq!(settings.reload_timeout(), Duration::from_millis(1234));
    assert_eq!(settings.config_version(), "3.38");
    assert_eq!(settings.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
}

#[rstest]
fn cli_flags_take_precedence_over_file(config_dir: TempDir) {
    let path = config_dir.path().join("logrig.toml");
    fs::write(&path, "poll_interval_ms = 400\n").expect("write configuration");
    let path_arg = path.to_string_lossy().into_owned();
    let settings = HarnessSettings::load_from_iter(args(&[
        "--config-path",
        &path_arg,
        "--poll-interval-ms",
        "20",
    ]))
    .expect("settings should load");
    assert_eq!(settings.poll_interval(), Duration::from_millis(20));
}
