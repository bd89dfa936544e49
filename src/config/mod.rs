pub mod discover;
pub mod loader;
pub mod paths;
pub mod schema;
pub mod updater;

pub use discover::discover;
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use paths::{interpolate, resolve_dir, to_web_path, PathContext, ScriptVariables};
pub use schema::{
    FileSet, HtmlDefaults, HtmlUpdate, UpdateConfig, ValidationError, ValidationIssue,
};
pub use updater::{
    Change, DocumentOutcome, DocumentStatus, HtmlUpdater, UpdateError, UpdateMode, UpdateReport,
};
