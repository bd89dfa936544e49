//! Text encodings for markup documents.
//!
//! Documents are patched as Rust strings, so each file is decoded once on
//! read and re-encoded with the same charset on write. Any WHATWG encoding
//! label is accepted (`UTF-8`, `UTF-16LE`, `ISO-8859-1`, `windows-1252`,
//! `Shift_JIS`, ...). A byte-order mark is never sniffed: it is kept as a
//! leading U+FEFF character in the decoded text and written back as is.

use encoding_rs::{DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

#[derive(Error, Debug)]
pub enum CharsetError {
    #[error("malformed {encoding} input at byte {offset}")]
    Malformed {
        encoding: &'static str,
        offset: usize,
    },
}

impl Default for Charset {
    fn default() -> Self {
        Self(UTF_8)
    }
}

impl From<&'static Encoding> for Charset {
    fn from(encoding: &'static Encoding) -> Self {
        Self(encoding)
    }
}

impl Charset {
    /// Look up a charset by WHATWG label, ignoring ASCII case and surrounding
    /// whitespace. An empty label means UTF-8.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Some(Self::default());
        }
        Encoding::for_label_no_replacement(label.as_bytes()).map(Self)
    }

    pub fn name(self) -> &'static str {
        self.0.name()
    }

    pub fn encoding(self) -> &'static Encoding {
        self.0
    }

    /// Decode `bytes` strictly: malformed input is an error, never replaced.
    pub fn decode(self, bytes: &[u8]) -> Result<String, CharsetError> {
        let mut decoder = self.0.new_decoder_without_bom_handling();
        let mut text = String::with_capacity(bytes.len());
        let mut consumed = 0;
        loop {
            let (result, read) =
                decoder.decode_to_string_without_replacement(&bytes[consumed..], &mut text, true);
            consumed += read;
            match result {
                DecoderResult::InputEmpty => return Ok(text),
                DecoderResult::OutputFull => {
                    let remaining = bytes.len() - consumed;
                    let needed = decoder
                        .max_utf8_buffer_length_without_replacement(remaining)
                        .unwrap_or(remaining);
                    text.reserve(needed.max(4));
                }
                DecoderResult::Malformed(bad, after) => {
                    let offset = consumed.saturating_sub(usize::from(bad) + usize::from(after));
                    return Err(CharsetError::Malformed {
                        encoding: self.name(),
                        offset,
                    });
                }
            }
        }
    }

    /// Encode `text` for writing.
    ///
    /// UTF-16 is written in its own byte order. Characters a legacy encoding
    /// cannot represent become numeric character references.
    pub fn encode(self, text: &str) -> Vec<u8> {
        if self.0 == UTF_16LE {
            text.encode_utf16().flat_map(u16::to_le_bytes).collect()
        } else if self.0 == UTF_16BE {
            text.encode_utf16().flat_map(u16::to_be_bytes).collect()
        } else {
            let (bytes, _, unmappable) = self.0.encode(text);
            if unmappable {
                log::debug!("{} cannot represent every character; wrote character references", self.name());
            }
            bytes.into_owned()
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
