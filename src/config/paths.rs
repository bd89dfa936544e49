//! Replacement paths: what a document's script reference should say.

use crate::config::schema::{HtmlDefaults, HtmlUpdate};
use relative_path::{RelativePath, RelativePathBuf};
use std::path::{Component, Path, PathBuf};

/// Join `parts` onto `base` in order, skipping blanks. An absolute part
/// replaces everything before it.
pub fn resolve_dir(base: &Path, parts: &[Option<&str>]) -> PathBuf {
    parts
        .iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .fold(base.to_path_buf(), |dir, part| dir.join(part))
}

/// How one rule relates documents to scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    /// `#{...}` template taking precedence over computed relative paths.
    pub source_path: Option<String>,
    /// Directory document paths are taken relative to.
    pub root: PathBuf,
    /// Directory script paths are taken relative to.
    pub script_root: PathBuf,
    /// Relate the physical locations of document and script instead of
    /// their paths below `root` and `script_root`.
    pub use_physical_root: bool,
}

impl PathContext {
    /// Settings for `update`, falling back to `defaults`. Relative roots are
    /// resolved against `base_dir`; unset roots are `base_dir` itself.
    pub fn new(base_dir: &Path, update: &HtmlUpdate, defaults: &HtmlDefaults) -> Self {
        Self {
            source_path: update.source_path(defaults).map(str::to_owned),
            root: resolve_dir(base_dir, &[update.root(defaults)]),
            script_root: resolve_dir(base_dir, &[update.script_root(defaults)]),
            use_physical_root: update.use_physical_root(defaults),
        }
    }

    /// The reference `document` should use for `script`.
    ///
    /// Both paths must be absolute, or relative to the same directory.
    pub fn replacement_path(&self, document: &Path, script: &Path) -> String {
        if let Some(template) = &self.source_path {
            let variables = ScriptVariables::new(script, &self.script_root);
            return interpolate(template, |name| variables.get(name)).replace('\\', "/");
        }

        let (document, script) = if self.use_physical_root {
            (lexical(document), lexical(script))
        } else {
            (
                relativize(&self.root, document),
                relativize(&self.script_root, script),
            )
        };
        let document_dir = document.parent().unwrap_or(RelativePath::new(""));
        to_web_path(document_dir.relative(&script).as_str())
    }
}

/// Values available to a `source_path` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptVariables {
    /// `app.min.js`
    pub filename: String,
    /// `js`
    pub extension: String,
    /// `app.min`
    pub basename: String,
    /// Directory of the script relative to the script root, `/`-separated.
    pub path: String,
}

impl ScriptVariables {
    pub fn new(script: &Path, script_root: &Path) -> Self {
        let text = |part: Option<&std::ffi::OsStr>| {
            part.map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let directory = script.parent().unwrap_or(Path::new(""));
        Self {
            filename: text(script.file_name()),
            extension: text(script.extension()),
            basename: text(script.file_stem()),
            path: relativize(script_root, directory).into_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "filename" => Some(&self.filename),
            "extension" => Some(&self.extension),
            "basename" => Some(&self.basename),
            "path" => Some(&self.path),
            _ => None,
        }
    }
}

/// Substitute `#{name}` variables in `template`.
///
/// `##{` produces a literal `#{`. Unknown variables and an unclosed `#{`
/// are kept verbatim.
pub fn interpolate<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(at) = rest.find("#{") {
        if rest[..at].ends_with('#') {
            out.push_str(&rest[..at - 1]);
            out.push_str("#{");
            rest = &rest[at + 2..];
            continue;
        }

        out.push_str(&rest[..at]);
        let after = &rest[at + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[at..]);
            return out;
        };
        let name = &after[..close];
        match lookup(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[at..at + 2 + close + 1]),
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// `/`-separated form of a relative reference, prefixed with `./` unless it
/// is absolute or already starts with `.`.
pub fn to_web_path(path: &str) -> String {
    let unix = path.replace('\\', "/");
    if unix.starts_with('/') || unix.starts_with('.') || Path::new(path).is_absolute() {
        unix
    } else {
        format!("./{unix}")
    }
}

/// `target` relative to `base`, computed lexically.
fn relativize(base: &Path, target: &Path) -> RelativePathBuf {
    lexical(base).relative(lexical(target))
}

/// A path's normal components as a normalized relative path. Roots and
/// prefixes are dropped, so two absolute paths stay comparable.
fn lexical(path: &Path) -> RelativePathBuf {
    let mut out = RelativePathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(&*part.to_string_lossy()),
            Component::ParentDir => out.push(".."),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(root: &str, script_root: &str) -> PathContext {
        PathContext {
            source_path: None,
            root: PathBuf::from(root),
            script_root: PathBuf::from(script_root),
            use_physical_root: false,
        }
    }

    #[test]
    fn test_resolve_dir() {
        let base = Path::new("/project");
        assert_eq!(
            resolve_dir(base, &[Some("src/main/webapp"), None, Some("pages")]),
            PathBuf::from("/project/src/main/webapp/pages")
        );
        assert_eq!(
            resolve_dir(base, &[Some("web"), Some("/srv/www")]),
            PathBuf::from("/srv/www")
        );
        assert_eq!(resolve_dir(base, &[Some(" "), None]), PathBuf::from("/project"));
    }

    #[test]
    fn test_interpolate() {
        let lookup = |name: &str| match name {
            "filename" => Some("app.min.js"),
            "path" => Some("lib"),
            _ => None,
        };
        assert_eq!(interpolate("js/#{filename}", lookup), "js/app.min.js");
        assert_eq!(interpolate("#{path}/#{filename}?v=1", lookup), "lib/app.min.js?v=1");
        assert_eq!(interpolate("##{filename}", lookup), "#{filename}");
        assert_eq!(interpolate("#{unknown}/x", lookup), "#{unknown}/x");
        assert_eq!(interpolate("a/#{filename", lookup), "a/#{filename");
        assert_eq!(interpolate("plain#", lookup), "plain#");
    }

    #[test]
    fn test_script_variables() {
        let vars = ScriptVariables::new(
            Path::new("/p/target/js/vendor/app.min.js"),
            Path::new("/p/target/js"),
        );
        assert_eq!(vars.filename, "app.min.js");
        assert_eq!(vars.extension, "js");
        assert_eq!(vars.basename, "app.min");
        assert_eq!(vars.path, "vendor");
        assert_eq!(vars.get("nope"), None);
    }

    #[test]
    fn test_to_web_path() {
        assert_eq!(to_web_path("js/app.js"), "./js/app.js");
        assert_eq!(to_web_path("../js/app.js"), "../js/app.js");
        assert_eq!(to_web_path("./app.js"), "./app.js");
        assert_eq!(to_web_path("/js/app.js"), "/js/app.js");
        assert_eq!(to_web_path("js\\app.js"), "./js/app.js");
    }

    #[test]
    fn test_relative_to_roots() {
        let ctx = context("/p/webapp", "/p/target/webapp");
        assert_eq!(
            ctx.replacement_path(
                Path::new("/p/webapp/index.html"),
                Path::new("/p/target/webapp/js/app.js")
            ),
            "./js/app.js"
        );
        assert_eq!(
            ctx.replacement_path(
                Path::new("/p/webapp/pages/about.html"),
                Path::new("/p/target/webapp/js/app.js")
            ),
            "../js/app.js"
        );
    }

    #[test]
    fn test_physical_paths() {
        let mut ctx = context("/ignored", "/ignored");
        ctx.use_physical_root = true;
        assert_eq!(
            ctx.replacement_path(
                Path::new("/p/src/main/webapp/index.html"),
                Path::new("/p/target/js/app.js")
            ),
            "../../../target/js/app.js"
        );
    }

    #[test]
    fn test_source_path_wins() {
        let mut ctx = context("/p/webapp", "/p/target");
        ctx.use_physical_root = true;
        ctx.source_path = Some("/static/#{path}/#{basename}.#{extension}".into());
        assert_eq!(
            ctx.replacement_path(
                Path::new("/p/webapp/index.html"),
                Path::new("/p/target/js/app.min.js")
            ),
            "/static/js/app.min.js"
        );
    }

    #[test]
    fn test_context_from_config() {
        let defaults = HtmlDefaults {
            root: Some("webapp".into()),
            ..HtmlDefaults::default()
        };
        let update = HtmlUpdate {
            script_root: Some("/abs/js".into()),
            ..HtmlUpdate::default()
        };
        let ctx = PathContext::new(Path::new("/p"), &update, &defaults);
        assert_eq!(ctx.root, PathBuf::from("/p/webapp"));
        assert_eq!(ctx.script_root, PathBuf::from("/abs/js"));
        assert_eq!(ctx.source_path, None);
        assert!(!ctx.use_physical_root);
    }
}
