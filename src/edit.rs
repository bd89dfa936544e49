use std::io::Write;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

/// Byte length of a UTF-8 encoded byte-order mark (U+FEFF).
pub const BOM_LEN: usize = '\u{feff}'.len_utf8();

/// The fundamental edit primitive: replace `[byte_start, byte_end)` of the
/// original text with `new_text`.
///
/// Offsets always refer to the *original* text, never to text produced by
/// applying other edits. [`apply`] takes care of ordering so that this holds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until it is applied"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Text to put at [byte_start, byte_end)
    pub new_text: String,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid byte range: [{byte_start}, {byte_end}) in text of length {text_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        text_len: usize,
    },

    #[error("Edit boundary {offset} does not fall on a character boundary")]
    NotCharBoundary { offset: usize },

    #[error(
        "Conflicting edits: [{first_start}, {first_end}) and [{second_start}, {second_end}) overlap"
    )]
    Conflict {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("Edit [{byte_start}, {byte_end}) crosses the start tag boundary at {boundary}")]
    CrossesStartTag {
        byte_start: usize,
        byte_end: usize,
        boundary: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Edit {
    pub fn new(byte_start: usize, byte_end: usize, new_text: impl Into<String>) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
        }
    }

    /// Pure insertion at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    /// Removal of `[byte_start, byte_end)`.
    pub fn delete(byte_start: usize, byte_end: usize) -> Self {
        Self::new(byte_start, byte_end, String::new())
    }

    pub fn is_insertion(&self) -> bool {
        self.byte_start == self.byte_end
    }

    pub fn span(&self) -> Range<usize> {
        self.byte_start..self.byte_end
    }

    /// The same edit moved `offset` bytes towards the end of the text.
    pub fn with_offset(self, offset: usize) -> Self {
        Self {
            byte_start: self.byte_start + offset,
            byte_end: self.byte_end + offset,
            new_text: self.new_text,
        }
    }

    fn validate(&self, text: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > text.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                text_len: text.len(),
            });
        }
        for offset in [self.byte_start, self.byte_end] {
            if !text.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }
        Ok(())
    }

    /// The error for an edit that ends up on the wrong side of a start tag
    /// ending at `boundary`.
    pub(crate) fn crosses(&self, boundary: usize) -> EditError {
        EditError::CrossesStartTag {
            byte_start: self.byte_start,
            byte_end: self.byte_end,
            boundary,
        }
    }

    fn conflict(&self, other: &Edit) -> EditError {
        EditError::Conflict {
            first_start: self.byte_start,
            first_end: self.byte_end,
            second_start: other.byte_start,
            second_end: other.byte_end,
        }
    }
}

/// Shift every edit past a leading byte-order mark.
///
/// The markup parser reports offsets relative to the text after the BOM, so
/// edits computed from it must be moved before they are spliced into a buffer
/// that still starts with one.
pub fn adjust_for_bom(original: &str, edits: Vec<Edit>) -> Vec<Edit> {
    if original.starts_with('\u{feff}') {
        edits
            .into_iter()
            .map(|edit| edit.with_offset(BOM_LEN))
            .collect()
    } else {
        edits
    }
}

/// Order edits for application against `text`.
///
/// Returns the edits sorted by `byte_start` descending, after:
/// - validating each range against `text`,
/// - collapsing exact duplicates,
/// - merging pure insertions at the same offset (in the order they were planned),
/// - rejecting every other shared start or overlap as [`EditError::Conflict`].
pub fn schedule(text: &str, mut edits: Vec<Edit>) -> Result<Vec<Edit>, EditError> {
    for edit in &edits {
        edit.validate(text)?;
    }

    // Stable sort keeps the planned order among equal starts.
    edits.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

    let mut scheduled: Vec<Edit> = Vec::with_capacity(edits.len());
    for edit in edits {
        match scheduled.last_mut() {
            Some(previous) if previous.byte_start == edit.byte_start => {
                if *previous == edit {
                    log::trace!("dropping duplicate edit at {}", edit.byte_start);
                } else if previous.is_insertion() && edit.is_insertion() {
                    previous.new_text.push_str(&edit.new_text);
                } else {
                    return Err(previous.conflict(&edit));
                }
            }
            Some(previous) if edit.byte_end > previous.byte_start => {
                return Err(edit.conflict(previous));
            }
            _ => scheduled.push(edit),
        }
    }

    Ok(scheduled)
}

/// Apply edits to `text`, producing a new string.
///
/// Edits are applied from the highest offset down, so the original-text
/// offsets of the remaining edits stay valid after every splice.
pub fn apply(text: &str, edits: Vec<Edit>) -> Result<String, EditError> {
    let scheduled = schedule(text, edits)?;
    let mut result = text.to_owned();
    for edit in scheduled {
        result.replace_range(edit.span(), &edit.new_text);
    }
    Ok(result)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full content lands or the file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
