use thiserror::Error;

/// Syntax error in a CSS or XPath expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectorError {
    #[error("selector '{selector}' must have the form <type>:<value> with type id, css or xpath")]
    MissingType { selector: String },

    #[error("unknown selector type '{kind}'{}", did_you_mean(.suggestion))]
    UnknownType {
        kind: String,
        suggestion: Option<&'static str>,
    },

    #[error("invalid CSS query '{query}': {source}")]
    InvalidCss { query: String, source: ParseError },

    #[error("invalid XPath expression '{expression}': {source}")]
    InvalidXPath {
        expression: String,
        source: ParseError,
    },

    #[error("XPath expression '{expression}' failed: {message}")]
    XPathEvaluation { expression: String, message: String },
}

fn did_you_mean(suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}
