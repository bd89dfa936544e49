//! Resolve a [`FileSet`] against a directory.

use crate::config::schema::FileSet;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Every file under `dir` whose `/`-separated path relative to `dir` matches
/// an include pattern and no exclude pattern, sorted.
///
/// A directory that does not exist yields no files. Invalid patterns never
/// match; [`UpdateConfig::validate`](crate::config::UpdateConfig::validate)
/// reports them up front.
pub fn discover(dir: &Path, files: &FileSet) -> Result<Vec<PathBuf>, walkdir::Error> {
    if !dir.is_dir() {
        log::debug!("{} is not a directory, nothing to scan", dir.display());
        return Ok(Vec::new());
    }

    let includes = compile(files.includes());
    let excludes = compile(files.excludes.iter().map(String::as_str));

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_slash_path(dir, entry.path()) else {
            continue;
        };
        let matches = |patterns: &[Pattern]| {
            patterns
                .iter()
                .any(|pattern| pattern.matches_with(&relative, MATCH_OPTIONS))
        };
        if matches(&includes) && !matches(&excludes) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    log::trace!("found {} files under {}", found.len(), dir.display());
    Ok(found)
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>) -> Vec<Pattern> {
    patterns.filter_map(|p| Pattern::new(p).ok()).collect()
}

fn relative_slash_path(dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(dir).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}
