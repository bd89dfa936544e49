use crate::edit::Edit;
use crate::markup::escape::escape_attribute;
use crate::markup::{Attribute, ElementRef};
use crate::patch::{PatchOptions, QuoteStyle};

/// Plan the edit that gives `element` the attribute `name="value"`.
///
/// Returns `None` when the attribute already has that value (a bare attribute
/// counts as the empty string). Otherwise, by how the attribute appears in the
/// start tag:
/// - absent: ` name="value"` is inserted before the closing `>` or `/>`,
/// - bare (`<script src>`): `="value"` is inserted after the name,
/// - empty value (`src=""`, `src  =  ''`): there are no value characters to
///   address, so everything from the end of the name up to the next attribute
///   (or the closing delimiter) is rewritten as `="value"`,
/// - otherwise only the value characters are replaced.
pub fn plan_set_attribute(
    element: ElementRef<'_>,
    name: &str,
    value: &str,
    options: &PatchOptions,
) -> Option<Edit> {
    let escaped = escape_attribute(value, options.escaping);

    let Some((index, attribute)) = element.find_attribute(name) else {
        let at = element.closing_delimiter_offset();
        return Some(Edit::insert(at, format!(" {name}=\"{escaped}\"")));
    };

    if attribute.value().unwrap_or("") == value {
        return None;
    }

    if !attribute.has_declared_value() {
        let at = attribute.value_range().end.offset;
        return Some(Edit::insert(at, format!("=\"{escaped}\"")));
    }

    let value_start = attribute.value_range().start.offset;
    if attribute.name_range().end.offset == value_start {
        let (end, separator) = match element.attributes().get(index + 1) {
            Some(next) => (next.name_range().start.offset, " "),
            None => (element.closing_delimiter_offset(), ""),
        };
        return Some(Edit::new(
            value_start,
            end,
            format!("=\"{escaped}\"{separator}"),
        ));
    }

    Some(replace_value(
        element.document().source(),
        attribute,
        &escaped,
        options.quote_style,
    ))
}

/// Replace the characters of a non-empty value.
fn replace_value(source: &str, attribute: &Attribute, escaped: &str, style: QuoteStyle) -> Edit {
    let span = attribute.value_range().span();
    match attribute.quote() {
        Some(quote) => {
            let closed = source[span.end..].starts_with(quote);
            if style == QuoteStyle::Double && quote != '"' && closed {
                Edit::new(span.start - 1, span.end + 1, format!("\"{escaped}\""))
            } else {
                Edit::new(span.start, span.end, escaped)
            }
        }
        None if style == QuoteStyle::Double || needs_quotes(escaped) => {
            Edit::new(span.start, span.end, format!("\"{escaped}\""))
        }
        None => Edit::new(span.start, span.end, escaped),
    }
}

/// Whether an escaped value cannot stand unquoted.
fn needs_quotes(escaped: &str) -> bool {
    escaped.is_empty()
        || escaped.ends_with('/')
        || escaped
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '=' | '`'))
}
