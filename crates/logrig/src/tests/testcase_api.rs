//! Tests for the [`Testcase`] fixture bundle.

use anyhow::{Context, Result, ensure};
use camino::Utf8PathBuf;
use logrig_config::HarnessSettings;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{
    ConfigError, DaemonState, GenerateOptions, HarnessError, LifecycleError, OptionMap,
    StopOutcome, Testcase,
};

#[fixture]
fn root() -> TempDir {
    tempfile::tempdir().expect("work root")
}

fn testcase_in(root: &TempDir) -> Testcase {
    let work_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 path");
    let settings = HarnessSettings::default()
        .with_work_root(work_root)
        .with_daemon_binary("/nonexistent/logrig/daemon");
    Testcase::new(settings).expect("testcase")
}

#[rstest]
fn reload_before_start_is_rejected_without_regenerating(root: TempDir) {
    let mut testcase = testcase_in(&root);

    let error = testcase
        .reload(GenerateOptions::regenerate())
        .expect_err("daemon is stopped");

    assert!(matches!(
        error,
        HarnessError::Lifecycle(LifecycleError::InvalidState {
            state: DaemonState::Stopped,
            ..
        })
    ));
    assert_eq!(testcase.config().generations(), 0);
    assert!(!testcase.context().config_path().exists());
}

#[rstest]
fn failed_start_keeps_the_generated_configuration(root: TempDir) {
    let mut testcase = testcase_in(&root);
    let (source, _) = testcase
        .create_source("file", &OptionMap::new(), true)
        .expect("source");
    let (destination, _) = testcase
        .create_destination("file", &OptionMap::new(), true)
        .expect("destination");
    testcase
        .config_mut()
        .connect_statements_in_logpath(&[source], &[destination])
        .expect("connect");

    let error = testcase
        .start(GenerateOptions::default())
        .expect_err("binary is missing");

    assert!(matches!(
        error,
        HarnessError::Lifecycle(LifecycleError::LaunchDaemon { .. })
    ));
    assert_eq!(testcase.daemon().state(), DaemonState::Failed);
    assert_eq!(testcase.config().generations(), 1);
    assert_eq!(testcase.stop().expect("stop"), StopOutcome::NotRunning);
}

#[rstest]
fn invalid_settings_fail_construction(root: TempDir) {
    let work_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 path");
    let settings = HarnessSettings {
        poll_interval_ms: Some(0),
        ..HarnessSettings::default()
    }
    .with_work_root(work_root);

    let error = Testcase::new(settings).expect_err("zero poll interval");

    assert!(matches!(error, HarnessError::Context(_)));
}

#[rstest]
fn unknown_driver_surfaces_as_config_error(root: TempDir) {
    let mut testcase = testcase_in(&root);
    let error = testcase
        .create_destination("kafka", &OptionMap::new(), true)
        .expect_err("no such driver");
    assert!(matches!(error, ConfigError::UnknownDriver { driver } if driver == "kafka"));
}

#[rstest]
fn with_daemon_rebuilds_the_controller_for_this_run(root: TempDir) -> Result<()> {
    let testcase = testcase_in(&root)
        .with_daemon(|daemon| daemon.with_extra_args(["--ready-delay-ms", "5"]));
    let arguments: Vec<String> = testcase
        .daemon()
        .command()
        .arguments()
        .iter()
        .map(|argument| argument.to_string_lossy().into_owned())
        .collect();

    let config_flag = format!("--cfgfile={}", testcase.context().config_path().display());
    ensure!(
        arguments.contains(&config_flag),
        "missing {config_flag} in {arguments:?}"
    );
    let extra = arguments
        .get(arguments.len().saturating_sub(2)..)
        .context("argument vector too short")?;
    ensure!(extra == ["--ready-delay-ms", "5"], "unexpected tail {extra:?}");
    ensure!(testcase.daemon().state() == DaemonState::Stopped);
    Ok(())
}
