//! Integration tests for update config loading and rule settings
//!
//! Configs are written to disk and loaded the way the CLI loads them, then
//! driven through the updater.

use markup_patcher::config::{
    load_from_path, load_from_str, ConfigError, DocumentStatus, HtmlUpdater, UpdateMode,
    ValidationIssue,
};
use markup_patcher::patch::QuoteStyle;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "update.toml",
        r#"
[html]
dir = "src/main/webapp"
root = "src/main/webapp"
script_root = "target/webapp"
quote_style = "double"

[[updates]]
scripts = "css:script[data-bundle]"
attributes = ["src", "data-original"]
encoding = "UTF-16LE"

[updates.files]
includes = ["**/*.xhtml"]
excludes = ["WEB-INF/**"]

[[updates]]
dir = "admin"
scripts = "id:main"
use_physical_root = true
"#,
    );

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.html.quote_style, QuoteStyle::Double);
    assert_eq!(config.updates.len(), 2);

    let first = &config.updates[0];
    assert_eq!(first.attribute_names(), vec!["src", "data-original"]);
    assert_eq!(first.charset().name(), "UTF-16LE");
    assert_eq!(first.files.excludes, vec!["WEB-INF/**"]);

    let second = &config.updates[1];
    assert_eq!(second.attribute_names(), vec!["src"]);
    assert!(second.use_physical_root(&config.html));
    assert_eq!(second.script_root(&config.html), Some("target/webapp"));
}

#[test]
fn test_unknown_field_types_are_toml_errors() {
    let err = load_from_str("[[updates]]\nattributes = \"src\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));
}

#[test]
fn test_validation_error_reports_path_and_every_issue() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "bad.toml",
        r#"
[[updates]]
encoding = "EBCDIC"

[[updates]]
attributes = [""]
"#,
    );

    let err = load_from_path(&path).unwrap_err();
    let ConfigError::Validation { path: Some(reported), source } = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(reported, &path);
    assert_eq!(
        source.issues,
        vec![
            ValidationIssue::UnsupportedEncoding {
                update: 0,
                label: "EBCDIC".into()
            },
            ValidationIssue::EmptyAttributeName { update: 1 },
        ]
    );
    let message = err.to_string();
    assert!(message.contains("bad.toml"));
    assert!(message.contains("EBCDIC"));
}

#[test]
fn test_rules_run_in_order_over_their_own_directories() {
    let dir = TempDir::new().unwrap();
    let public = write(dir.path(), "public/index.html", "<script src=old.js></script>");
    let admin = write(
        dir.path(),
        "admin/index.html",
        "<script id=main></script><script id=other></script>",
    );
    let config = load_from_str(
        r#"
[[updates]]
dir = "public"
root = "public"
script_root = "dist"

[[updates]]
dir = "admin"
scripts = "id:other"
source_path = "/static/#{basename}.#{extension}?v=2"
"#,
    )
    .unwrap();

    let report = HtmlUpdater::new(&config, dir.path())
        .process(&[PathBuf::from("dist/js/app.js")], UpdateMode::Write);

    assert_eq!(report.count(DocumentStatus::Updated), 2);
    assert_eq!(report.documents[0].path, public);
    assert_eq!(
        fs::read_to_string(&public).unwrap(),
        "<script src=./js/app.js></script>"
    );
    assert_eq!(
        fs::read_to_string(&admin).unwrap(),
        "<script id=main></script><script id=other src=\"/static/app.js?v=2\"></script>"
    );
}

#[test]
fn test_quote_style_double_applies_to_every_rule() {
    let dir = TempDir::new().unwrap();
    let page = write(dir.path(), "index.html", "<script src='old.js'></script>");
    let config = load_from_str(
        r#"
[html]
quote_style = "double"

[[updates]]
"#,
    )
    .unwrap();

    HtmlUpdater::new(&config, dir.path()).process(&[PathBuf::from("app.js")], UpdateMode::Write);
    assert_eq!(
        fs::read_to_string(page).unwrap(),
        "<script src=\"./app.js\"></script>"
    );
}
