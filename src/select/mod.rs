//! Element selectors: `id:<value>`, `css:<query>`, `xpath:<expression>`, or
//! the empty string for the first `<script>` element.

pub mod css;
mod errors;
pub mod xpath;

pub use css::SelectorList;
pub use errors::{ParseError, SelectorError};
pub use xpath::XPath;

use crate::markup::{Document, NodeId};
use std::str::FromStr;

const SELECTOR_TYPES: &[&str] = &["id", "css", "xpath"];

/// Which elements of a document an update touches.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    ById(String),
    ByQuery(SelectorList),
    ByXPath(XPath),
    /// The first `script` element in the document.
    Default,
}

impl Selector {
    /// Parse `<type>:<value>`. The type is everything before the first colon
    /// and must be non-empty.
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        if selector.is_empty() {
            return Ok(Selector::Default);
        }

        let Some((kind, value)) = selector.split_once(':').filter(|(kind, _)| !kind.is_empty())
        else {
            return Err(SelectorError::MissingType {
                selector: selector.to_owned(),
            });
        };

        match kind {
            "id" => Ok(Selector::ById(value.to_owned())),
            "css" => SelectorList::parse(value)
                .map(Selector::ByQuery)
                .map_err(|source| SelectorError::InvalidCss {
                    query: value.to_owned(),
                    source,
                }),
            "xpath" => XPath::parse(value)
                .map(Selector::ByXPath)
                .map_err(|source| SelectorError::InvalidXPath {
                    expression: value.to_owned(),
                    source,
                }),
            other => Err(SelectorError::UnknownType {
                kind: other.to_owned(),
                suggestion: suggest_type(other),
            }),
        }
    }

    /// Matching elements in document order. `id:` and the default selector
    /// yield at most one element.
    pub fn select(&self, document: &Document) -> Result<Vec<NodeId>, SelectorError> {
        let found = match self {
            Selector::ById(id) => document.element_by_id(id).into_iter().collect(),
            Selector::ByQuery(list) => list.select(document),
            Selector::ByXPath(xpath) => xpath.select(document)?,
            Selector::Default => document.elements_by_tag("script").take(1).collect(),
        };
        log::trace!("selector {self:?} matched {} elements", found.len());
        Ok(found)
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

/// Closest known selector type by edit distance, if it is close enough to be
/// a plausible typo.
fn suggest_type(kind: &str) -> Option<&'static str> {
    let lowered = kind.to_ascii_lowercase();
    SELECTOR_TYPES
        .iter()
        .map(|candidate| (*candidate, strsim::levenshtein(&lowered, candidate)))
        .filter(|(candidate, distance)| *distance <= candidate.len().div_ceil(2))
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}
