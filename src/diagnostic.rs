//! Diagnostics produced while updating documents.
//!
//! The library never logs user-facing problems itself; it returns them as
//! [`Diagnostic`] values attached to each document's outcome and leaves the
//! reporting to the caller.

use crate::markup::Position;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// The `log` level a diagnostic of this severity is reported at.
    pub fn level(self) -> log::Level {
        match self {
            Severity::Error => log::Level::Error,
            Severity::Warning => log::Level::Warn,
            Severity::Info => log::Level::Info,
            Severity::Debug => log::Level::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        })
    }
}

/// A message about one document, optionally pointing into its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: PathBuf,
    pub position: Option<Position>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, path: &Path, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.to_path_buf(),
            position: None,
            message: message.into(),
        }
    }

    pub fn error(path: &Path, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, path, message)
    }

    pub fn warning(path: &Path, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, path, message)
    }

    pub fn info(path: &Path, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, path, message)
    }

    pub fn debug(path: &Path, message: impl Into<String>) -> Self {
        Self::new(Severity::Debug, path, message)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{}:{}: {}", self.path.display(), position, self.message),
            None => write!(f, "{}: {}", self.path.display(), self.message),
        }
    }
}
