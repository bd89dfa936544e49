//! End-to-end workflow test
//!
//! Tests the complete workflow on a small site:
//! 1. Load config
//! 2. Dry run
//! 3. Update
//! 4. Check idempotency
//! 5. Switch to a new script

use markup_patcher::config::{load_from_path, DocumentStatus, HtmlUpdater, UpdateMode};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const INDEX: &str = "\u{feff}<!DOCTYPE html>
<html lang=\"en\">
<head>
  <meta charset=\"utf-8\">
  <!-- bundle below is rewritten at build time -->
  <script id=\"bundle\" type=\"module\"
          src='js/dev/main.js' data-src=\"\">
    import './dev/a.js';
    import './dev/b.js';
  </script>
  <script src=\"vendor/analytics.js\" async></script>
</head>
<body class=\"home\"><p>Hello &amp; welcome</p></body>
</html>
";

const ABOUT: &str = "<html><head>
<script id=bundle></script>
</head><body><script id=other src=keep.js></script></body></html>
";

const FEED: &str = "<?xml version=\"1.0\"?>
<page xmlns=\"urn:x\"><Script id=\"bundle\" SRC=\"old.js\"/></page>
";

fn setup_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("site/pages")).unwrap();
    fs::create_dir_all(dir.path().join("dist/js")).unwrap();
    fs::write(dir.path().join("site/index.html"), INDEX).unwrap();
    fs::write(dir.path().join("site/pages/about.html"), ABOUT).unwrap();
    fs::write(dir.path().join("site/feed.xml"), FEED).unwrap();
    fs::write(
        dir.path().join("update.toml"),
        r#"
[html]
dir = "site"
root = "site"
script_root = "dist"

[[updates]]
scripts = "id:bundle"
attributes = ["src", "data-src"]

[updates.files]
includes = ["**/*.html", "*.xml"]
"#,
    )
    .unwrap();
    dir
}

#[test]
fn test_full_workflow() {
    let dir = setup_site();
    let config = load_from_path(dir.path().join("update.toml")).unwrap();
    let updater = HtmlUpdater::new(&config, dir.path());
    let scripts = [PathBuf::from("dist/js/main.min.js")];

    // Dry run reports every document that would change, touching none.
    let dry = updater.process(&scripts, UpdateMode::DryRun);
    assert_eq!(dry.count(DocumentStatus::WouldUpdate), 3);
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html")).unwrap(),
        INDEX
    );

    // Update.
    let report = updater.process(&scripts, UpdateMode::Write);
    assert_eq!(report.count(DocumentStatus::Updated), 3);
    assert!(!report.has_failures());

    let index = fs::read_to_string(dir.path().join("site/index.html")).unwrap();
    let expected_index = INDEX
        .replace("src='js/dev/main.js'", "src='./js/main.min.js'")
        .replace("data-src=\"\">", "data-src=\"./js/main.min.js\">")
        .replace(
            ">\n    import './dev/a.js';\n    import './dev/b.js';\n  </script>",
            "></script>",
        );
    assert_eq!(index, expected_index);

    let about = fs::read_to_string(dir.path().join("site/pages/about.html")).unwrap();
    assert_eq!(
        about,
        ABOUT.replace(
            "<script id=bundle>",
            "<script id=bundle src=\"../js/main.min.js\" data-src=\"../js/main.min.js\">"
        )
    );

    // XML keeps case: `SRC` is not `src`.
    let feed = fs::read_to_string(dir.path().join("site/feed.xml")).unwrap();
    assert_eq!(
        feed,
        FEED.replace(
            "SRC=\"old.js\"/>",
            "SRC=\"old.js\" src=\"./js/main.min.js\" data-src=\"./js/main.min.js\"/>"
        )
    );

    // Idempotency.
    let again = updater.process(&scripts, UpdateMode::Write);
    assert_eq!(again.count(DocumentStatus::UpToDate), 3);
    assert!(again.changed().next().is_none());

    // A new build output moves every reference along.
    let next = updater.process(&[PathBuf::from("dist/js/main.2.min.js")], UpdateMode::Write);
    assert_eq!(next.count(DocumentStatus::Updated), 3);
    let index = fs::read_to_string(dir.path().join("site/index.html")).unwrap();
    assert!(index.starts_with('\u{feff}'));
    assert!(index.contains("src='./js/main.2.min.js' data-src=\"./js/main.2.min.js\""));
    assert!(index.contains("<script src=\"vendor/analytics.js\" async></script>"));
}

#[test]
fn test_untouched_bytes_survive() {
    let dir = setup_site();
    let config = load_from_path(dir.path().join("update.toml")).unwrap();
    HtmlUpdater::new(&config, dir.path())
        .process(&[PathBuf::from("dist/js/main.min.js")], UpdateMode::Write);

    let index = fs::read_to_string(dir.path().join("site/index.html")).unwrap();
    for untouched in [
        "<!DOCTYPE html>",
        "<!-- bundle below is rewritten at build time -->",
        "<script id=\"bundle\" type=\"module\"\n          src='",
        "<body class=\"home\"><p>Hello &amp; welcome</p></body>",
    ] {
        assert!(index.contains(untouched), "lost {untouched:?}");
    }
}
