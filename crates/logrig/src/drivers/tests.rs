//! Unit tests for driver resolution.

use camino::Utf8PathBuf;
use logrig_config::HarnessSettings;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct Harness {
    _root: TempDir,
    context: TestContext,
}

#[fixture]
fn harness() -> Harness {
    let root = tempfile::tempdir().expect("work root");
    let work_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 path");
    let context = TestContext::new(HarnessSettings::default().with_work_root(work_root))
        .expect("context");
    Harness {
        _root: root,
        context,
    }
}

#[rstest]
fn unknown_driver_is_rejected(mut harness: Harness) {
    let catalog = DriverCatalog::new();
    let error = catalog
        .resolve(
            &mut harness.context,
            "carrier-pigeon",
            StatementKind::Source,
            &OptionMap::new(),
            true,
        )
        .expect_err("unknown driver");
    assert!(matches!(error, ConfigError::UnknownDriver { driver } if driver == "carrier-pigeon"));
}

#[rstest]
#[case::internal_destination("internal", StatementKind::Destination)]
#[case::wildcard_destination("wildcard-file", StatementKind::Destination)]
fn unsupported_kind_is_rejected(
    mut harness: Harness,
    #[case] driver: &str,
    #[case] kind: StatementKind,
) {
    let error = DriverCatalog::new()
        .resolve(&mut harness.context, driver, kind, &OptionMap::new(), true)
        .expect_err("unsupported kind");
    assert!(matches!(error, ConfigError::UnsupportedKind { .. }));
}

#[rstest]
fn mandatory_file_path_is_generated_inside_run_dir(mut harness: Harness) {
    let resolved = DriverCatalog::new()
        .resolve(
            &mut harness.context,
            "file",
            StatementKind::Destination,
            &OptionMap::new(),
            true,
        )
        .expect("resolve");
    let path = resolved
        .options
        .get("file_path")
        .and_then(OptionValue::as_path)
        .expect("generated path");
    assert!(path.starts_with(harness.context.run_dir()));
    assert_eq!(resolved.connection_options, resolved.options);
    assert_eq!(resolved.endpoint, Some(Endpoint::File(path.to_path_buf())));
}

#[rstest]
fn user_values_override_generated_ones(mut harness: Harness) {
    let user = OptionMap::new()
        .with("file_path", PathBuf::from("/explicit/in.log"))
        .with("flags", OptionValue::Raw("no-parse".to_owned()));
    let resolved = DriverCatalog::new()
        .resolve(&mut harness.context, "file", StatementKind::Source, &user, true)
        .expect("resolve");
    assert_eq!(
        resolved.options.get("file_path"),
        Some(&OptionValue::Path(PathBuf::from("/explicit/in.log")))
    );
    assert_eq!(resolved.connection_options.len(), 1);
    assert_eq!(resolved.options.len(), 2);
    assert!(harness.context.paths().registered_paths().is_empty());
}

#[rstest]
fn without_mandatory_options_user_options_are_used_alone(mut harness: Harness) {
    let user = OptionMap::new().with("ip", "127.0.0.1");
    let resolved = DriverCatalog::new()
        .resolve(
            &mut harness.context,
            "network",
            StatementKind::Source,
            &user,
            false,
        )
        .expect("resolve");
    assert_eq!(resolved.options, user);
    assert_eq!(resolved.endpoint, None);
}

#[rstest]
fn network_generates_port_and_endpoint(mut harness: Harness) {
    let resolved = DriverCatalog::new()
        .resolve(
            &mut harness.context,
            "network",
            StatementKind::Destination,
            &OptionMap::new().with("transport", "udp"),
            true,
        )
        .expect("resolve");
    let port = resolved
        .options
        .get("port")
        .and_then(OptionValue::as_port)
        .expect("port");
    let Some(Endpoint::Network {
        port: endpoint_port,
        transport,
        ..
    }) = resolved.endpoint
    else {
        panic!("expected a network endpoint, got {:?}", resolved.endpoint);
    };
    assert_eq!(endpoint_port, port);
    assert_eq!(transport, NetworkTransport::Udp);
}

#[rstest]
fn program_destination_bridges_to_registered_file(mut harness: Harness) {
    let resolved = DriverCatalog::new()
        .resolve(
            &mut harness.context,
            "program",
            StatementKind::Destination,
            &OptionMap::new(),
            true,
        )
        .expect("resolve");
    let Some(Endpoint::File(path)) = resolved.endpoint else {
        panic!("expected a file endpoint");
    };
    let command = resolved
        .options
        .get("command")
        .and_then(OptionValue::as_text)
        .expect("command");
    assert_eq!(command, program_command(StatementKind::Destination, &path));
}

#[test]
fn program_commands_quote_paths() {
    let path = std::path::Path::new("/tmp/it's.log");
    assert_eq!(
        program_command(StatementKind::Source, path),
        r"tail -F -n +1 '/tmp/it'\''s.log'"
    );
}

#[rstest]
fn internal_source_has_no_endpoint(mut harness: Harness) {
    let resolved = DriverCatalog::new()
        .resolve(
            &mut harness.context,
            "internal",
            StatementKind::Source,
            &OptionMap::new(),
            true,
        )
        .expect("resolve");
    assert!(resolved.options.is_empty());
    assert_eq!(resolved.endpoint, None);
}

#[test]
fn registered_schema_replaces_builtin() {
    let mut catalog = DriverCatalog::new();
    catalog.register(DriverSchema {
        name: "file",
        kinds: SOURCE_ONLY,
        positional: None,
        mandatory: &[],
        optional: &[],
        endpoint: EndpointRule::None,
    });
    let schema = catalog.schema("file").expect("schema");
    assert!(!schema.supports(StatementKind::Destination));
}

#[rstest]
fn unlisted_key_is_rejected_when_generating(mut harness: Harness) {
    let user = OptionMap::new().with("no_such_key", 1_u16);
    let error = DriverCatalog::new()
        .resolve(&mut harness.context, "file", StatementKind::Source, &user, true)
        .expect_err("unknown key");
    assert!(matches!(
        error,
        ConfigError::UnknownOption { driver, key } if driver == "file" && key == "no_such_key"
    ));
    assert!(harness.context.paths().registered_paths().is_empty());
}

#[rstest]
fn unlisted_key_is_kept_without_generation(mut harness: Harness) {
    let user = OptionMap::new().with("no_such_key", 1_u16);
    let resolved = DriverCatalog::new()
        .resolve(&mut harness.context, "file", StatementKind::Source, &user, false)
        .expect("unchecked options");
    assert_eq!(resolved.options, user);
}

#[rstest]
#[case::file("file", "encoding")]
#[case::wildcard_recursive("wildcard-file", "recursive")]
#[case::wildcard_max_files("wildcard-file", "max-files")]
#[case::network("network", "max-connections")]
#[case::program("program", "inherit-environment")]
fn optional_keys_are_accepted(mut harness: Harness, #[case] driver: &str, #[case] key: &str) {
    let user = OptionMap::new().with(key, "yes");
    let resolved = DriverCatalog::new()
        .resolve(&mut harness.context, driver, StatementKind::Source, &user, true)
        .expect("optional key");
    assert_eq!(resolved.options.get(key), Some(&OptionValue::from("yes")));
    assert!(!resolved.connection_options.contains_key(key));
}
