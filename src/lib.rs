//! Markup Patcher: point script references in HTML/XML documents at
//! generated files, touching nothing else.
//!
//! Documents are never re-serialized. The parser records where every tag,
//! attribute name and attribute value sits in the original text, planners turn
//! the desired state into byte-span [`Edit`]s, and the edits are spliced into
//! the original buffer from the highest offset down. Whitespace, quoting,
//! comments and attribute order outside the edited spans survive unchanged.
//!
//! # Pipeline
//!
//! parse → select → plan → schedule → apply → compare → write
//!
//! - [`markup`]: tolerant HTML/XML parser with exact source ranges
//! - [`select`]: `id:`, `css:` and `xpath:` selectors
//! - [`patch`]: attribute and text-content edit planners
//! - [`edit`]: BOM adjustment, scheduling and application of edits
//! - [`config`]: update rules, document discovery and the [`HtmlUpdater`]
//!
//! # Example
//!
//! ```
//! use markup_patcher::markup::{Document, Flavor};
//! use markup_patcher::patch::{plan_element, PatchOptions};
//! use markup_patcher::select::Selector;
//!
//! let html = "<head>\n  <script src = 'old.js'  defer>init()</script>\n</head>";
//! let document = Document::parse(html, Flavor::Html);
//! let selected = Selector::parse("css:script[defer]").unwrap().select(&document).unwrap();
//!
//! let mut edits = Vec::new();
//! for id in selected {
//!     let element = document.element(id).unwrap();
//!     edits.extend(plan_element(element, &["src".to_owned()], "app.min.js", &PatchOptions::default()).unwrap());
//! }
//!
//! let updated = markup_patcher::edit::apply(html, edits).unwrap();
//! assert_eq!(updated, "<head>\n  <script src = 'app.min.js'  defer></script>\n</head>");
//! ```

pub mod charset;
pub mod config;
pub mod diagnostic;
pub mod edit;
pub mod markup;
pub mod patch;
pub mod select;

pub use config::{load_from_path, HtmlUpdater, UpdateConfig, UpdateMode, UpdateReport};
pub use diagnostic::{Diagnostic, Severity};
pub use edit::{Edit, EditError};
pub use markup::{Document, Flavor};
pub use select::{Selector, SelectorError};
