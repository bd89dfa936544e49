//! Attribute value escaping.

use crate::markup::Flavor;
use std::borrow::Cow;

/// Escape `value` for use inside a quoted attribute of a `flavor` document.
///
/// Both quote characters are escaped, so the result is safe between `"` and
/// between `'`.
pub fn escape_attribute(value: &str, flavor: Flavor) -> Cow<'_, str> {
    match flavor {
        Flavor::Html => html_escape::encode_quoted_attribute(value),
        Flavor::Xml => escape_xml_attribute(value),
    }
}

/// Decode character and entity references.
pub fn unescape(raw: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(raw)
}

/// XML attribute escaping: quotes and markup characters, plus the whitespace
/// characters attribute-value normalisation would otherwise turn into spaces.
/// Characters that cannot appear in XML 1.0 become a space.
fn escape_xml_attribute(value: &str) -> Cow<'_, str> {
    if !value.chars().any(needs_xml_escape) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    let mut buf = [0; 4];
    for c in value.chars() {
        match c {
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            c if !is_xml_char(c) => escaped.push(' '),
            c => {
                let encoded: &str = c.encode_utf8(&mut buf);
                escaped.push_str(&html_escape::encode_quoted_attribute(encoded));
            }
        }
    }
    Cow::Owned(escaped)
}

fn needs_xml_escape(c: char) -> bool {
    matches!(c, '&' | '<' | '>' | '"' | '\'' | '\t' | '\n' | '\r') || !is_xml_char(c)
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}
