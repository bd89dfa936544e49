//! Apply an [`UpdateConfig`] to the documents it selects.
//!
//! Each rule scans its directory, and each document found is handled on its
//! own: parse, select, plan, schedule, apply, compare, write. A problem with
//! one document is recorded in that document's [`DocumentOutcome`] and never
//! stops the others.

use crate::charset::CharsetError;
use crate::config::discover::discover;
use crate::config::paths::{resolve_dir, PathContext};
use crate::config::schema::{HtmlUpdate, UpdateConfig};
use crate::diagnostic::{Diagnostic, Severity};
use crate::edit::{self, Edit, EditError};
use crate::markup::{Document, Flavor, NodeId, Position};
use crate::patch::{plan_element, PatchOptions, QuoteStyle};
use crate::select::{Selector, SelectorError};
use serde::Serialize;
use std::collections::hash_map::{Entry, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: CharsetError,
    },

    #[error("failed to scan {}: {source}", .dir.display())]
    Scan {
        dir: PathBuf,
        source: walkdir::Error,
    },

    #[error("conflicting edits in {}: {source}", .path.display())]
    Schedule { path: PathBuf, source: EditError },

    #[error("<{element}> in {} would reference both {first} and {second}", .path.display())]
    Ambiguous {
        path: PathBuf,
        element: String,
        first: String,
        second: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: EditError },
}

/// Whether changed documents are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Write,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Changed and written.
    Updated,
    /// Nothing to change; the file was not touched.
    UpToDate,
    /// Would change, but this was a dry run.
    WouldUpdate,
    /// Could not be read or decoded.
    Skipped,
    /// Edits could not be applied or the result could not be written.
    Failed,
}

/// Text of a document before and after its edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub status: DocumentStatus,
    pub diagnostics: Vec<Diagnostic>,
    /// Present for `Updated` and `WouldUpdate`.
    #[serde(skip)]
    pub change: Option<Change>,
}

impl DocumentOutcome {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: DocumentStatus::UpToDate,
            diagnostics: Vec::new(),
            change: None,
        }
    }

    fn finish(mut self, status: DocumentStatus, diagnostic: Diagnostic) -> Self {
        self.status = status;
        self.diagnostics.push(diagnostic);
        self
    }

    fn fail(self, status: DocumentStatus, error: UpdateError) -> Self {
        let diagnostic = Diagnostic::error(&self.path, error.to_string());
        self.finish(status, diagnostic)
    }
}

/// Everything one run did, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Problems that belong to a rule rather than a document.
    pub diagnostics: Vec<Diagnostic>,
    pub documents: Vec<DocumentOutcome>,
}

impl UpdateReport {
    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    /// A document failed, or a rule could not scan its directory.
    pub fn has_failures(&self) -> bool {
        self.count(DocumentStatus::Failed) > 0
            || self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Documents that were, or in a dry run would be, changed.
    pub fn changed(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.change.is_some())
    }

    /// Rule diagnostics followed by every document's, in processing order.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.documents.iter().flat_map(|d| &d.diagnostics))
    }
}

/// Rewrites script references in the documents an [`UpdateConfig`] selects.
pub struct HtmlUpdater<'a> {
    config: &'a UpdateConfig,
    base_dir: PathBuf,
}

impl<'a> HtmlUpdater<'a> {
    /// `base_dir` anchors every relative directory in the config and every
    /// relative script path.
    pub fn new(config: &'a UpdateConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
        }
    }

    /// Point every document of every rule at `scripts`.
    pub fn process(&self, scripts: &[PathBuf], mode: UpdateMode) -> UpdateReport {
        let scripts: Vec<PathBuf> = scripts.iter().map(|s| self.base_dir.join(s)).collect();
        let mut report = UpdateReport::default();
        for update in &self.config.updates {
            self.process_update(update, &scripts, mode, &mut report);
        }
        report
    }

    fn process_update(
        &self,
        update: &HtmlUpdate,
        scripts: &[PathBuf],
        mode: UpdateMode,
        report: &mut UpdateReport,
    ) {
        let dir = resolve_dir(
            &self.base_dir,
            &[self.config.html.dir.as_deref(), update.dir.as_deref()],
        );
        let documents = match discover(&dir, &update.files) {
            Ok(documents) => documents,
            Err(source) => {
                let error = UpdateError::Scan {
                    dir: dir.clone(),
                    source,
                };
                report.diagnostics.push(Diagnostic::error(&dir, error.to_string()));
                return;
            }
        };
        if documents.is_empty() {
            report.diagnostics.push(Diagnostic::warning(
                &dir,
                format!("did not find any documents to update with {}", update.files),
            ));
            return;
        }

        let rule = Rule {
            update,
            selector: Selector::parse(&update.scripts),
            attributes: update.attribute_names(),
            paths: PathContext::new(&self.base_dir, update, &self.config.html),
            quote_style: self.config.html.quote_style,
        };
        for path in documents {
            report
                .documents
                .push(self.process_document(&rule, &path, scripts, mode));
        }
    }

    fn process_document(
        &self,
        rule: &Rule<'_>,
        path: &Path,
        scripts: &[PathBuf],
        mode: UpdateMode,
    ) -> DocumentOutcome {
        log::debug!("processing {}", path.display());
        let mut outcome = DocumentOutcome::new(path);
        let charset = rule.update.charset();

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                let error = UpdateError::Read {
                    path: path.to_path_buf(),
                    source,
                };
                return outcome.fail(DocumentStatus::Skipped, error);
            }
        };
        let text = match charset.decode(&bytes) {
            Ok(text) => text,
            Err(source) => {
                let error = UpdateError::Decode {
                    path: path.to_path_buf(),
                    source,
                };
                return outcome.fail(DocumentStatus::Skipped, error);
            }
        };

        let flavor = Flavor::from_path(path);
        let document = Document::parse(&text, flavor);
        outcome.diagnostics.extend(document.issues().iter().map(|issue| {
            Diagnostic::error(path, format!("parse error: {}", issue.message)).at(issue.position)
        }));

        let edits = match self.plan_document(rule, &document, path, scripts, &mut outcome.diagnostics) {
            Ok(edits) => edits,
            Err((error, position)) => {
                let diagnostic = Diagnostic::error(path, error.to_string()).at(position);
                return outcome.finish(DocumentStatus::Failed, diagnostic);
            }
        };
        if edits.is_empty() {
            return outcome.finish(
                DocumentStatus::UpToDate,
                Diagnostic::info(path, "already up-to-date"),
            );
        }

        let edits = edit::adjust_for_bom(&text, edits);
        let updated = match edit::apply(&text, edits) {
            Ok(updated) => updated,
            Err(source) => {
                let error = UpdateError::Schedule {
                    path: path.to_path_buf(),
                    source,
                };
                return outcome.fail(DocumentStatus::Failed, error);
            }
        };
        if updated == text {
            return outcome.finish(
                DocumentStatus::UpToDate,
                Diagnostic::info(path, "already up-to-date"),
            );
        }

        if mode == UpdateMode::Write {
            if let Err(source) = edit::atomic_write(path, &charset.encode(&updated)) {
                let error = UpdateError::Write {
                    path: path.to_path_buf(),
                    source,
                };
                return outcome.fail(DocumentStatus::Failed, error);
            }
        }

        outcome.change = Some(Change {
            before: text,
            after: updated,
        });
        match mode {
            UpdateMode::Write => outcome.finish(DocumentStatus::Updated, Diagnostic::info(path, "updated")),
            UpdateMode::DryRun => outcome.finish(
                DocumentStatus::WouldUpdate,
                Diagnostic::info(path, "would be updated"),
            ),
        }
    }

    /// Edits for every selected element and every script, in document
    /// coordinates (before BOM adjustment).
    ///
    /// An element may only be pointed at one reference. A second script
    /// resolving to a different path for an element already claimed fails the
    /// document, with the element's position.
    fn plan_document(
        &self,
        rule: &Rule<'_>,
        document: &Document,
        path: &Path,
        scripts: &[PathBuf],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<Edit>, (UpdateError, Position)> {
        let found = rule
            .selector
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|selector| selector.select(document));
        let elements = match found {
            Ok(elements) => elements,
            Err(error) => {
                diagnostics.push(Diagnostic::warning(path, format!("invalid selector: {error}")));
                Vec::new()
            }
        };
        if elements.is_empty() {
            diagnostics.push(Diagnostic::warning(
                path,
                format!(
                    "did not find any script elements to update via selector <{}>",
                    rule.update.scripts
                ),
            ));
            return Ok(Vec::new());
        }

        let options = PatchOptions::new(document.flavor()).with_quote_style(rule.quote_style);
        let mut claimed: HashMap<NodeId, String> = HashMap::new();
        let mut edits = Vec::new();
        for script in scripts {
            let value = rule.paths.replacement_path(path, script);
            for &id in &elements {
                let Some(element) = document.element(id) else {
                    continue;
                };
                let start = element.source_range().start;
                match claimed.entry(id) {
                    Entry::Occupied(first) if *first.get() == value => continue,
                    Entry::Occupied(first) => {
                        let error = UpdateError::Ambiguous {
                            path: path.to_path_buf(),
                            element: element.name().to_owned(),
                            first: first.get().clone(),
                            second: value,
                        };
                        return Err((error, start));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                }
                diagnostics.push(
                    Diagnostic::debug(path, format!("updating <{}> to {value}", element.name())).at(start),
                );
                let planned = plan_element(element, &rule.attributes, &value, &options).map_err(|source| {
                    let error = UpdateError::Schedule {
                        path: path.to_path_buf(),
                        source,
                    };
                    (error, start)
                })?;
                edits.extend(planned);
            }
        }
        Ok(edits)
    }
}

/// A rule with everything that does not depend on the document resolved.
struct Rule<'a> {
    update: &'a HtmlUpdate,
    selector: Result<Selector, SelectorError>,
    attributes: Vec<String>,
    paths: PathContext,
    quote_style: QuoteStyle,
}
