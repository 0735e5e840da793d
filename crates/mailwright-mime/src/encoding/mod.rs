//! MIME encoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header words and header
//! line folding. The [`stream`] submodule holds the incremental body
//! encoders used while compiling a message.

pub mod stream;

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::{self, Write as _};

pub use stream::BodyEncoder;

/// Maximum line length for encoded bodies and folded headers.
pub const MAX_LINE_LENGTH: usize = 76;

/// Maximum length of the encoded text inside one RFC 2047 word.
const MAX_WORD_LENGTH: usize = 52;

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64, wrapped into CRLF-separated lines of
/// [`MAX_LINE_LENGTH`] characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let mut out = Vec::new();
    let mut encoder = BodyEncoder::new(TransferEncoding::Base64);
    encoder.update(data, &mut out);
    encoder.finish(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Decodes Base64 data, ignoring line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks (LF or CRLF) become CRLF hard breaks, trailing whitespace
/// is escaped, and lines longer than 76 characters get soft breaks.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut out = Vec::new();
    let mut encoder = BodyEncoder::new(TransferEncoding::QuotedPrintable);
    encoder.update(data, &mut out);
    encoder.finish(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'=' {
            result.push(byte);
            continue;
        }

        // Soft line break
        match bytes.peek() {
            Some(b'\r') => {
                bytes.next();
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
                continue;
            }
            Some(b'\n') => {
                bytes.next();
                continue;
            }
            _ => {}
        }

        let hex: Vec<u8> = bytes.by_ref().take(2).collect();
        if hex.len() != 2 {
            return Err(Error::InvalidEncoding(
                "Incomplete escape sequence".to_string(),
            ));
        }
        let hex = std::str::from_utf8(&hex)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        let value = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(value);
    }

    Ok(result)
}

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Transfer encoding matching a word encoding choice.
    #[must_use]
    pub const fn from_word_encoding(encoding: WordEncoding) -> Self {
        match encoding {
            WordEncoding::Q => Self::QuotedPrintable,
            WordEncoding::B => Self::Base64,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// RFC 2047 encoded-word flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    /// `Q` encoding, readable for mostly-Latin text.
    Q,
    /// `B` (base64) encoding.
    B,
}

impl WordEncoding {
    /// Picks `Q` when Latin letters outnumber non-Latin and control
    /// characters, `B` otherwise.
    #[must_use]
    pub fn select(text: &str) -> Self {
        let non_latin = text.chars().filter(|c| is_non_latin(*c)).count();
        let latin = text.chars().filter(char::is_ascii_alphabetic).count();
        if non_latin < latin { Self::Q } else { Self::B }
    }

    /// Single-letter tag used inside encoded words.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Q => "Q",
            Self::B => "B",
        }
    }
}

const fn is_non_latin(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}') || c as u32 >= 0x80
}

/// Returns true if the text is printable ASCII (tabs and line breaks allowed).
#[must_use]
pub fn is_plain_text(text: &str) -> bool {
    text.chars()
        .all(|c| matches!(c, ' '..='~' | '\t' | '\r' | '\n'))
}

/// Returns true if any line of the text is longer than `limit` characters.
#[must_use]
pub fn has_longer_lines(text: &str, limit: usize) -> bool {
    text.split('\n')
        .any(|line| line.trim_end_matches('\r').chars().count() > limit)
}

/// Encodes text as one or more RFC 2047 encoded words separated by spaces.
///
/// Each word carries at most 52 characters of encoded text and never
/// splits a multi-byte character.
#[must_use]
pub fn encode_word(text: &str, encoding: WordEncoding) -> String {
    let mut words: Vec<String> = Vec::new();

    match encoding {
        WordEncoding::Q => {
            let mut current = String::new();
            for c in text.chars() {
                let mut encoded = String::new();
                q_encode_char(c, &mut encoded);
                if !current.is_empty() && current.len() + encoded.len() > MAX_WORD_LENGTH {
                    words.push(std::mem::take(&mut current));
                }
                current.push_str(&encoded);
            }
            if !current.is_empty() {
                words.push(current);
            }
        }
        WordEncoding::B => {
            let max_bytes = MAX_WORD_LENGTH / 4 * 3;
            let mut current = String::new();
            for c in text.chars() {
                if !current.is_empty() && current.len() + c.len_utf8() > max_bytes {
                    words.push(encode_base64(std::mem::take(&mut current).as_bytes()));
                }
                current.push(c);
            }
            if !current.is_empty() {
                words.push(encode_base64(current.as_bytes()));
            }
        }
    }

    words
        .iter()
        .map(|word| format!("=?UTF-8?{}?{word}?=", encoding.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn q_encode_char(c: char, out: &mut String) {
    match c {
        'a'..='z' | 'A'..='Z' | '0'..='9' | '!' | '*' | '+' | '-' | '/' => out.push(c),
        ' ' => out.push('_'),
        _ => {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "={byte:02X}");
            }
        }
    }
}

/// Encodes a header value using RFC 2047 where needed.
///
/// Only the span from the first to the last word containing characters
/// outside printable ASCII is encoded; surrounding ASCII words are kept
/// readable. `encoding` overrides the Latin/non-Latin heuristic.
#[must_use]
pub fn encode_words(value: &str, encoding: Option<WordEncoding>) -> String {
    let needs_encoding = |c: char| !matches!(c, ' '..='~' | '\t');
    if !value.chars().any(needs_encoding) {
        return value.to_string();
    }

    let mut start = None;
    let mut end = 0;
    let mut word_start = 0;
    let mut dirty = false;

    for (idx, c) in value.char_indices() {
        if c == ' ' || c == '\t' {
            if dirty {
                start.get_or_insert(word_start);
                end = idx;
            }
            word_start = idx + c.len_utf8();
            dirty = false;
        } else if needs_encoding(c) {
            dirty = true;
        }
    }
    if dirty {
        start.get_or_insert(word_start);
        end = value.len();
    }

    let start = start.unwrap_or(0);
    let span = &value[start..end];
    let encoding = encoding.unwrap_or_else(|| WordEncoding::select(span));

    format!(
        "{}{}{}",
        &value[..start],
        encode_word(span, encoding),
        &value[end..]
    )
}

/// Folds a header line so no line exceeds `max` characters where possible.
///
/// Lines are broken before a whitespace run; the continuation line keeps
/// the whitespace as its leading fold marker. A word longer than `max` is
/// never split.
#[must_use]
pub fn fold_lines(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len() + 8);
    let mut pos = 0;

    while pos < chars.len() {
        if chars.len() - pos <= max {
            result.extend(&chars[pos..]);
            break;
        }

        let end = pos + max;
        let window = &chars[pos..end];

        let run_start = window.iter().rposition(|c| c.is_whitespace()).map(|mut idx| {
            while idx > 0 && window[idx - 1].is_whitespace() {
                idx -= 1;
            }
            idx
        });

        let cut = match run_start {
            Some(idx) if idx > 0 => pos + idx,
            _ => chars[end..]
                .iter()
                .position(|c| c.is_whitespace())
                .map_or(chars.len(), |idx| end + idx),
        };

        result.extend(&chars[pos..cut]);
        pos = cut;
        if pos < chars.len() {
            result.push_str("\r\n");
        }
    }

    result
}
