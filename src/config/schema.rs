use crate::charset::Charset;
use crate::patch::QuoteStyle;
use serde::Deserialize;
use std::fmt;

/// Attribute updated when a rule names none.
pub const DEFAULT_ATTRIBUTE: &str = "src";

/// Files matched when a rule's file set lists no includes.
pub const DEFAULT_INCLUDE: &str = "**/*.html";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct UpdateConfig {
    #[serde(default)]
    pub html: HtmlDefaults,
    #[serde(default)]
    pub updates: Vec<HtmlUpdate>,
}

impl UpdateConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.updates.is_empty() {
            issues.push(ValidationIssue::NoUpdates);
        }

        for (index, update) in self.updates.iter().enumerate() {
            if update.attributes.iter().any(|name| name.trim().is_empty()) {
                issues.push(ValidationIssue::EmptyAttributeName { update: index });
            }

            if let Some(label) = &update.encoding {
                if Charset::from_label(label).is_none() {
                    issues.push(ValidationIssue::UnsupportedEncoding {
                        update: index,
                        label: label.clone(),
                    });
                }
            }

            for pattern in update.files.includes().chain(update.files.excludes.iter().map(String::as_str)) {
                if let Err(error) = glob::Pattern::new(pattern) {
                    issues.push(ValidationIssue::InvalidPattern {
                        update: index,
                        pattern: pattern.to_owned(),
                        message: error.msg.to_owned(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Settings shared by every rule; each rule may override them.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct HtmlDefaults {
    /// Directory scanned for documents, relative to the base directory.
    #[serde(default)]
    pub dir: Option<String>,
    /// Directory documents are considered relative to when relating them to
    /// scripts.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub script_root: Option<String>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub use_physical_root: Option<bool>,
    #[serde(default)]
    pub quote_style: QuoteStyle,
}

/// One `[[updates]]` rule.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct HtmlUpdate {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub files: FileSet,
    /// Selector expression; empty selects the first `<script>`.
    #[serde(default)]
    pub scripts: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub script_root: Option<String>,
    #[serde(default)]
    pub use_physical_root: Option<bool>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl HtmlUpdate {
    /// Configured attribute names, or `["src"]` when none are given.
    pub fn attribute_names(&self) -> Vec<String> {
        if self.attributes.is_empty() {
            vec![DEFAULT_ATTRIBUTE.to_owned()]
        } else {
            self.attributes.clone()
        }
    }

    /// Charset documents are read and written with. Unknown labels are
    /// rejected by [`UpdateConfig::validate`], so they fall back to UTF-8 here.
    pub fn charset(&self) -> Charset {
        self.encoding
            .as_deref()
            .and_then(Charset::from_label)
            .unwrap_or_default()
    }

    pub fn source_path<'a>(&'a self, defaults: &'a HtmlDefaults) -> Option<&'a str> {
        non_blank(&self.source_path).or_else(|| non_blank(&defaults.source_path))
    }

    pub fn root<'a>(&'a self, defaults: &'a HtmlDefaults) -> Option<&'a str> {
        non_blank(&self.root).or_else(|| non_blank(&defaults.root))
    }

    pub fn script_root<'a>(&'a self, defaults: &'a HtmlDefaults) -> Option<&'a str> {
        non_blank(&self.script_root).or_else(|| non_blank(&defaults.script_root))
    }

    pub fn use_physical_root(&self, defaults: &HtmlDefaults) -> bool {
        self.use_physical_root
            .or(defaults.use_physical_root)
            .unwrap_or(false)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

/// Include and exclude glob patterns, relative to the scanned directory.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FileSet {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl FileSet {
    /// Include patterns, with `**/*.html` standing in for an empty list.
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        let defaults: &[&str] = if self.includes.is_empty() {
            &[DEFAULT_INCLUDE]
        } else {
            &[]
        };
        self.includes
            .iter()
            .map(String::as_str)
            .chain(defaults.iter().copied())
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let includes: Vec<&str> = self.includes().collect();
        write!(f, "includes [{}]", includes.join(", "))?;
        if !self.excludes.is_empty() {
            write!(f, ", excludes [{}]", self.excludes.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Rules are identified by their 0-based position in `[[updates]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    NoUpdates,
    EmptyAttributeName {
        update: usize,
    },
    UnsupportedEncoding {
        update: usize,
        label: String,
    },
    InvalidPattern {
        update: usize,
        pattern: String,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NoUpdates => write!(f, "update config contains no [[updates]]"),
            ValidationIssue::EmptyAttributeName { update } => {
                write!(f, "update #{update} lists an empty attribute name")
            }
            ValidationIssue::UnsupportedEncoding { update, label } => write!(
                f,
                "update #{update} uses unsupported encoding '{label}' (expected a WHATWG encoding label such as UTF-8, UTF-16LE or ISO-8859-1)"
            ),
            ValidationIssue::InvalidPattern {
                update,
                pattern,
                message,
            } => write!(f, "update #{update} has invalid pattern '{pattern}': {message}"),
        }
    }
}
