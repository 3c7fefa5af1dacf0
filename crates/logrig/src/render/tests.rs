//! Renderer output, ordering and integrity checks.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use logrig_config::HarnessSettings;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::context::TestContext;
use crate::model::ConfigModel;

const INTERNAL_LOG: &str = "/var/log/logrig/internal.log";

struct Built {
    _root: TempDir,
    _context: TestContext,
    model: ConfigModel,
}

fn file_options(path: &str) -> OptionMap {
    OptionMap::new().with("file_path", PathBuf::from(path))
}

#[fixture]
fn built() -> Built {
    let root = tempfile::tempdir().expect("work root");
    let work_root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 path");
    let mut context =
        TestContext::new(HarnessSettings::default().with_work_root(work_root)).expect("context");
    let mut model = ConfigModel::new();
    model.add_global_options(&OptionMap::new().with("stats_level", 1).with("time_reap", 30));
    let (file_source, _) = model
        .create_source(
            &mut context,
            "file",
            &file_options("/var/log/logrig/in.log").with("flags", OptionValue::Raw("no-parse".to_owned())),
            false,
        )
        .expect("file source");
    let (network_source, _) = model
        .create_source(
            &mut context,
            "network",
            &OptionMap::new()
                .with("ip", "127.0.0.1")
                .with("port", 5514_u16)
                .with("transport", "tcp"),
            false,
        )
        .expect("network source");
    let (destination, _) = model
        .create_destination(
            &mut context,
            "file",
            &file_options("/var/log/logrig/out.log"),
            false,
        )
        .expect("destination");
    model
        .connect_statements_in_logpath(&[file_source, network_source], &[destination])
        .expect("logpath");
    Built {
        _root: root,
        _context: context,
        model,
    }
}

fn render(model: &ConfigModel, flags: RenderFlags) -> Result<String, ConfigError> {
    let snapshot = Snapshot {
        version: "4.0",
        global_options: model.global_options(),
        statements: model.statements(),
        logpaths: model.logpaths(),
        internal_log: Some(std::path::Path::new(INTERNAL_LOG)),
    };
    ConfigRenderer::render(&snapshot, flags)
}

const FULL: RenderFlags = RenderFlags {
    use_internal_source: true,
    mode: RenderMode::Full,
};

#[rstest]
fn full_render_matches_snapshot(built: Built) {
    let text = render(&built.model, FULL).expect("render");
    insta::assert_snapshot!("full_render", text);
}

#[rstest]
fn rendering_is_idempotent(built: Built) {
    let first = render(&built.model, FULL).expect("first render");
    let second = render(&built.model, FULL).expect("second render");
    assert_eq!(first, second);
}

#[rstest]
fn mandatory_only_drops_optional_keys(built: Built) {
    let flags = RenderFlags {
        use_internal_source: false,
        mode: RenderMode::MandatoryOnly,
    };
    let text = render(&built.model, flags).expect("render");
    assert!(text.contains("file(\"/var/log/logrig/in.log\");"));
    assert!(!text.contains("no-parse"));
    assert!(!text.contains(INTERNAL_SOURCE_ID));
}

#[rstest]
fn appended_destinations_render_in_list_order(mut built: Built) {
    let id = built.model.logpaths().first().expect("logpath").id();
    let logpath = built.model.logpath_mut(id).expect("logpath");
    let first = logpath.destination_statements.first().cloned().expect("destination");
    logpath.destination_statements.push(first);
    let text = render(&built.model, FULL).expect("render");
    assert_eq!(text.matches("destination(dst_3);").count(), 2);
}

#[rstest]
fn dangling_reference_aborts_render(mut built: Built) {
    let id = built.model.logpaths().first().expect("logpath").id();
    built
        .model
        .logpath_mut(id)
        .expect("logpath")
        .destination_statements
        .push(StatementId::new("dst_99"));
    let error = render(&built.model, FULL).expect_err("dangling reference");
    let ConfigError::DanglingReference { id: missing, kind, .. } = error else {
        panic!("expected DanglingReference, got {error:?}");
    };
    assert_eq!(missing.as_str(), "dst_99");
    assert_eq!(kind, StatementKind::Destination);
}

#[rstest]
fn misplaced_reference_is_a_kind_mismatch(mut built: Built) {
    let id = built.model.logpaths().first().expect("logpath").id();
    built
        .model
        .logpath_mut(id)
        .expect("logpath")
        .destination_statements
        .push(StatementId::new("src_1"));
    let error = render(&built.model, FULL).expect_err("kind mismatch");
    assert!(matches!(error, ConfigError::KindMismatch { .. }));
}

#[test]
fn empty_snapshot_renders_only_the_header() {
    let options = OptionMap::new();
    let snapshot = Snapshot {
        version: "3.38",
        global_options: &options,
        statements: &[],
        logpaths: &[],
        internal_log: None,
    };
    let flags = RenderFlags {
        use_internal_source: false,
        mode: RenderMode::Full,
    };
    assert_eq!(
        ConfigRenderer::render(&snapshot, flags).expect("render"),
        "@version: 3.38\n"
    );
}
