//! Markup documents with exact source positions.
//!
//! The patch engine never re-serializes a tree; it only needs to know where
//! every tag, attribute name and attribute value sits in the original text.
//! [`Document::parse`] builds an arena tree that records those ranges while
//! recovering from malformed input instead of failing.

pub mod escape;
pub mod node;
mod parser;
pub mod position;

pub use node::{Attribute, Document, Element, ElementRef, Node, NodeData, NodeId};
pub use position::{Position, Range};

use std::fmt;
use std::path::Path;

/// Markup dialect, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    #[default]
    Html,
    Xml,
}

impl Flavor {
    /// `.html` and `.htm` files are HTML; everything else is treated as XML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("html" | "htm") => Flavor::Html,
            _ => Flavor::Xml,
        }
    }

    /// Compare tag or attribute names: ASCII-case-insensitive for HTML,
    /// exact for XML.
    pub fn names_match(self, a: &str, b: &str) -> bool {
        match self {
            Flavor::Html => a.eq_ignore_ascii_case(b),
            Flavor::Xml => a == b,
        }
    }
}

/// A recoverable problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub position: Position,
    pub message: String,
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

impl Document {
    /// Parse `text`, recording source ranges for every node.
    ///
    /// A leading byte-order mark is skipped; all offsets are relative to the
    /// text after it (see [`Document::had_bom`]).
    pub fn parse(text: &str, flavor: Flavor) -> Document {
        parser::parse(text, flavor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_from_path() {
        assert_eq!(Flavor::from_path(Path::new("a/index.html")), Flavor::Html);
        assert_eq!(Flavor::from_path(Path::new("page.htm")), Flavor::Html);
        assert_eq!(Flavor::from_path(Path::new("page.xhtml")), Flavor::Xml);
        assert_eq!(Flavor::from_path(Path::new("config.xml")), Flavor::Xml);
        assert_eq!(Flavor::from_path(Path::new("README")), Flavor::Xml);
    }

    #[test]
    fn test_names_match() {
        assert!(Flavor::Html.names_match("SRC", "src"));
        assert!(!Flavor::Xml.names_match("SRC", "src"));
        assert!(Flavor::Xml.names_match("src", "src"));
    }
}
