//! Edit planners: turn "this element should have this attribute value" and
//! "this element should be empty" into [`Edit`]s against the original text.
//!
//! Planners only read the [`Document`](crate::markup::Document); nothing is
//! re-serialized, so every byte outside the planned ranges survives as is.

pub mod attribute;
pub mod content;

pub use attribute::plan_set_attribute;
pub use content::plan_clear_text_content;

use crate::edit::{Edit, EditError};
use crate::markup::{ElementRef, Flavor};
use serde::Deserialize;

/// How an existing attribute value's quotes are treated when it is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    /// Keep the quote characters already in the document.
    #[default]
    Preserve,
    /// Always write `"..."`.
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchOptions {
    /// Which escaping rules new values follow.
    pub escaping: Flavor,
    pub quote_style: QuoteStyle,
}

impl PatchOptions {
    pub fn new(escaping: Flavor) -> Self {
        Self {
            escaping,
            quote_style: QuoteStyle::default(),
        }
    }

    pub fn with_quote_style(mut self, quote_style: QuoteStyle) -> Self {
        self.quote_style = quote_style;
        self
    }
}

/// All edits for one selected element: one attribute edit per name, then the
/// text-clear edit.
///
/// Attribute edits must stay inside the start tag and the clear edit must
/// start after it. An edit on the wrong side of that boundary is reported as
/// [`EditError::CrossesStartTag`] rather than handed to the scheduler.
pub fn plan_element(
    element: ElementRef<'_>,
    attribute_names: &[String],
    value: &str,
    options: &PatchOptions,
) -> Result<Vec<Edit>, EditError> {
    let start_tag_end = element.source_range().end.offset;
    let mut edits: Vec<Edit> = attribute_names
        .iter()
        .filter_map(|name| plan_set_attribute(element, name, value, options))
        .collect();
    if let Some(stray) = edits.iter().find(|edit| edit.byte_end > start_tag_end) {
        return Err(stray.crosses(start_tag_end));
    }

    if let Some(clear) = plan_clear_text_content(element) {
        if clear.byte_start < start_tag_end {
            return Err(clear.crosses(start_tag_end));
        }
        edits.push(clear);
    }
    Ok(edits)
}
