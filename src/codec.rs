//! Single-byte text encodings
//!
//! Doors talk to terminals one byte per character. Decoding never fails and
//! never carries partial characters across reads; characters that do not fit
//! the encoding are sent as `?`.

use serde::{Deserialize, Serialize};

/// Replacement for characters outside the encoding
const REPLACEMENT: u8 = b'?';

/// Text encoding used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// 7-bit ASCII; high bytes decode as `?`
    #[default]
    Ascii,
    /// ISO-8859-1; every byte maps to the code point of the same value
    Latin1,
}

impl TextEncoding {
    /// Decode bytes, appending to `out`
    pub fn decode_into(self, bytes: &[u8], out: &mut String) {
        out.reserve(bytes.len());
        match self {
            Self::Ascii => out.extend(bytes.iter().map(|&b| {
                if b.is_ascii() {
                    b as char
                } else {
                    REPLACEMENT as char
                }
            })),
            Self::Latin1 => out.extend(bytes.iter().map(|&b| b as char)),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        let mut out = String::new();
        self.decode_into(bytes, &mut out);
        out
    }

    /// Encode a single character
    #[inline]
    pub fn encode_char(self, ch: char) -> u8 {
        let limit = match self {
            Self::Ascii => 0x7F,
            Self::Latin1 => 0xFF,
        };
        if (ch as u32) <= limit {
            ch as u32 as u8
        } else {
            REPLACEMENT
        }
    }

    /// Encode text, appending to `out`
    pub fn encode_into(self, text: &str, out: &mut Vec<u8>) {
        out.reserve(text.len());
        out.extend(text.chars().map(|ch| self.encode_char(ch)));
    }
}
