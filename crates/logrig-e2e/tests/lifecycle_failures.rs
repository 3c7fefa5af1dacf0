//! Lifecycle failures and non-file drivers exercised against `logrig-stubd`.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use logrig::{
    DaemonState, DriverProperty, GenerateOptions, HarnessError, LifecycleError, OptionMap,
    StopOutcome, Testcase,
};
use logrig_config::HarnessSettings;
use logrig_e2e::READY_MARKER;
use logrig_e2e::fixtures::{MESSAGE, StubHarness};
use rstest::{fixture, rstest};

const STUBD: &str = env!("CARGO_BIN_EXE_logrig-stubd");

#[fixture]
fn harness() -> StubHarness {
    StubHarness::new(STUBD).expect("harness")
}

fn harness_with(adjust: impl FnOnce(&mut HarnessSettings)) -> StubHarness {
    StubHarness::new(STUBD)
        .expect("harness")
        .with_settings(adjust)
}

fn connect(
    testcase: &mut Testcase,
    source: &str,
    source_options: &OptionMap,
    destination: &str,
) -> (DriverProperty, DriverProperty) {
    let (source_id, source_property) = testcase
        .create_source(source, source_options, true)
        .expect("source");
    let (destination_id, destination_property) = testcase
        .create_destination(destination, &OptionMap::new(), true)
        .expect("destination");
    testcase
        .config_mut()
        .connect_statements_in_logpath(&[source_id], &[destination_id])
        .expect("log path");
    (source_property, destination_property)
}

fn wait_for_text(path: &std::path::Path, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if fs::read_to_string(path).is_ok_and(|text| text.contains(needle)) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn slow_daemon_hits_the_startup_timeout() {
    let harness = harness_with(|settings| settings.startup_timeout_ms = Some(300));
    let mut testcase = harness
        .testcase()
        .expect("testcase")
        .with_daemon(|daemon| daemon.with_extra_args(["--ready-delay-ms", "3000"]));
    connect(&mut testcase, "file", &OptionMap::new(), "file");

    let error = testcase
        .start(GenerateOptions::default())
        .expect_err("startup should time out");
    assert!(matches!(
        error,
        HarnessError::Lifecycle(LifecycleError::StartupTimeout { timeout_ms: 300, .. })
    ));
    assert_eq!(testcase.daemon().state(), DaemonState::Failed);
    assert!(testcase.daemon().pid().is_none(), "timed-out daemon is reaped");
}

#[rstest]
fn malformed_configuration_fails_startup(harness: StubHarness) {
    let mut testcase = harness.testcase().expect("testcase");
    let error = testcase
        .daemon_mut()
        .start("source {\n")
        .expect_err("parse failure ends the daemon");
    match error {
        LifecycleError::StartupFailed { exit_status, console } => {
            assert_eq!(exit_status, Some(1));
            let output = fs::read_to_string(console).expect("console");
            assert!(output.contains("error parsing configuration"), "{output}");
        }
        other => panic!("expected StartupFailed, got: {other:?}"),
    }
    assert_eq!(testcase.daemon().state(), DaemonState::Failed);
}

#[test]
fn daemon_ignoring_termination_is_killed() {
    let harness = harness_with(|settings| settings.stop_grace_ms = Some(300));
    let mut testcase = harness
        .testcase()
        .expect("testcase")
        .with_daemon(|daemon| daemon.with_extra_args(["--ignore-sigterm"]));
    connect(&mut testcase, "file", &OptionMap::new(), "file");
    testcase.start(GenerateOptions::default()).expect("start");

    assert_eq!(testcase.stop().expect("stop"), StopOutcome::Killed);
    assert_eq!(testcase.daemon().state(), DaemonState::Stopped);
}

#[test]
fn rejected_reload_times_out_and_fails() {
    let harness = harness_with(|settings| settings.reload_timeout_ms = Some(500));
    let mut testcase = harness.testcase().expect("testcase");
    connect(&mut testcase, "file", &OptionMap::new(), "file");
    testcase.start(GenerateOptions::default()).expect("start");

    let error = testcase
        .daemon_mut()
        .reload_with("log {\n")
        .expect_err("broken configuration is not acknowledged");
    assert!(matches!(error, LifecycleError::ReloadTimeout { .. }));
    assert_eq!(testcase.daemon().state(), DaemonState::Failed);

    assert!(testcase.daemon().pid().is_none(), "failed daemon is reaped");

    assert!(matches!(
        testcase.reload(GenerateOptions::regenerate()),
        Err(HarnessError::Lifecycle(LifecycleError::InvalidState {
            state: DaemonState::Failed,
            ..
        }))
    ));
    assert_eq!(testcase.stop().expect("stop"), StopOutcome::NotRunning);
    assert_eq!(testcase.daemon().state(), DaemonState::Failed);
}

#[rstest]
fn reload_supersedes_the_first_generation(harness: StubHarness) {
    let mut testcase = harness.testcase().expect("testcase");
    let (mut source, mut destination) = connect(&mut testcase, "file", &OptionMap::new(), "file");
    testcase.start(GenerateOptions::default()).expect("start");

    let text = testcase
        .reload(GenerateOptions::default())
        .expect("reload regenerates without re_create_config");
    assert_eq!(testcase.config().generations(), 2);
    assert_eq!(
        fs::read_to_string(testcase.context().config_path()).expect("config"),
        text
    );
    assert_eq!(testcase.daemon().state(), DaemonState::Running);

    source.writer().expect("writer").send(MESSAGE).expect("send");
    let received = destination
        .listener()
        .expect("listener")
        .receive()
        .expect("receive");
    assert_eq!(received, vec![MESSAGE.to_owned()]);
}

#[rstest]
#[case::tcp("tcp")]
#[case::udp("udp")]
fn network_source_feeds_file_destination(harness: StubHarness, #[case] transport: &str) {
    let mut testcase = harness.testcase().expect("testcase");
    let options = OptionMap::new().with("transport", transport);
    let (mut source, mut destination) = connect(&mut testcase, "network", &options, "file");
    testcase.start(GenerateOptions::default()).expect("start");

    source.writer().expect("writer").send(MESSAGE).expect("send");
    let received = destination
        .listener()
        .expect("listener")
        .receive()
        .expect("receive");
    assert_eq!(received, vec![MESSAGE.to_owned()]);
}

#[rstest]
#[case::network("network")]
#[case::program("program")]
fn file_source_feeds_non_file_destination(harness: StubHarness, #[case] driver: &str) {
    let mut testcase = harness.testcase().expect("testcase");
    let (mut source, mut destination) = connect(&mut testcase, "file", &OptionMap::new(), driver);
    testcase.start(GenerateOptions::default()).expect("start");

    source.writer().expect("writer").send(MESSAGE).expect("send");
    let received = destination
        .listener()
        .expect("listener")
        .receive()
        .expect("receive");
    assert_eq!(received, vec![MESSAGE.to_owned()]);
}

#[rstest]
fn wildcard_source_feeds_file_destination(harness: StubHarness) {
    let mut testcase = harness.testcase().expect("testcase");
    let (mut source, mut destination) =
        connect(&mut testcase, "wildcard-file", &OptionMap::new(), "file");
    testcase.start(GenerateOptions::default()).expect("start");

    source
        .writer()
        .expect("writer")
        .send_all(["first", "second"])
        .expect("send");
    let received = destination
        .listener()
        .expect("listener")
        .receive_count(2, Duration::from_secs(3))
        .expect("receive");
    assert_eq!(received, vec!["first".to_owned(), "second".to_owned()]);
}

#[rstest]
fn internal_route_records_daemon_messages(harness: StubHarness) {
    let mut testcase = harness.testcase().expect("testcase");
    connect(&mut testcase, "file", &OptionMap::new(), "file");
    testcase.start(GenerateOptions::default()).expect("start");

    let internal = testcase
        .config()
        .internal_log_path()
        .expect("internal route rendered")
        .to_path_buf();
    assert!(wait_for_text(&internal, READY_MARKER, Duration::from_secs(3)));
    testcase.stop().expect("stop");
}
