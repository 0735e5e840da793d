//! MIME content type handling.

use crate::error::{Error, Result};
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// Longest parameter value chunk before RFC 2231 continuations are used.
const MAX_PARAM_LENGTH: usize = 50;

/// MIME content type with ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters in insertion order (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_lowercase(),
            sub_type: sub_type.into().to_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a text/html content type.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart/mixed content type. The boundary is assigned when
    /// the message is streamed.
    #[must_use]
    pub fn multipart_mixed() -> Self {
        Self::new("multipart", "mixed")
    }

    /// Creates a multipart/alternative content type.
    #[must_use]
    pub fn multipart_alternative() -> Self {
        Self::new("multipart", "alternative")
    }

    /// Creates a multipart/related content type.
    #[must_use]
    pub fn multipart_related() -> Self {
        Self::new("multipart", "related")
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Sets a parameter, replacing an existing one with the same name.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_lowercase();
        let value = value.into();
        match self.parameters.iter_mut().find(|(name, _)| *name == key) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((key, value)),
        }
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted; value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = split_unquoted(s, ';').into_iter();

        let type_str = parts.next().unwrap_or_default();
        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;
        if main_type.trim().is_empty() || sub_type.trim().is_empty() {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        let mut content_type = Self::new(main_type.trim(), sub_type.trim());

        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .map_or_else(|| value.to_string(), |v| v.replace("\\\"", "\""));
                content_type.set_parameter(key.trim(), value);
            }
        }

        Ok(content_type)
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_structured(&self.mime_type(), &self.parameters))
    }
}

fn split_unquoted(s: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' && quoted {
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }
    parts.push(current);

    parts
}

/// Renders `value; key=param; ...` for structured headers such as
/// Content-Type and Content-Disposition.
///
/// Non-ASCII or long parameter values use RFC 2231 encoding with
/// continuations.
#[must_use]
pub fn format_structured(value: &str, parameters: &[(String, String)]) -> String {
    let mut out = value.to_string();
    for (key, param) in parameters {
        for (name, encoded) in format_parameter(key, param) {
            let _ = write!(out, "; {name}={encoded}");
        }
    }
    out
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value.starts_with('-')
        || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
}

fn quote(value: &str) -> String {
    if needs_quoting(value) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn is_attr_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte)
}

fn format_parameter(key: &str, value: &str) -> Vec<(String, String)> {
    let ascii = value.chars().all(|c| matches!(c, ' '..='~'));

    if ascii {
        if value.len() <= MAX_PARAM_LENGTH {
            return vec![(key.to_string(), quote(value))];
        }
        return value
            .as_bytes()
            .chunks(MAX_PARAM_LENGTH)
            .enumerate()
            .map(|(idx, chunk)| {
                let chunk = String::from_utf8_lossy(chunk)
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"");
                (format!("{key}*{idx}"), format!("\"{chunk}\""))
            })
            .collect();
    }

    // Percent-encode per character so a continuation never splits one
    let mut chunks: Vec<String> = vec!["utf-8''".to_string()];
    for c in value.chars() {
        let mut encoded = String::new();
        let mut buf = [0u8; 4];
        for &byte in c.encode_utf8(&mut buf).as_bytes() {
            if is_attr_char(byte) {
                encoded.push(char::from(byte));
            } else {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
        let last = chunks.len() - 1;
        if chunks[last].len() + encoded.len() > MAX_PARAM_LENGTH && chunks[last] != "utf-8''" {
            chunks.push(encoded);
        } else {
            chunks[last].push_str(&encoded);
        }
    }

    if chunks.len() == 1 {
        return vec![(format!("{key}*"), chunks.remove(0))];
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, chunk)| (format!("{key}*{idx}*"), chunk))
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("Text", "Plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain();
        assert!(ct.is_text());
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse() {
        let ct: ContentType = "text/plain; charset=utf-8; format=flowed".parse().unwrap();
        assert_eq!(ct.mime_type(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.parameters[1], ("format".to_string(), "flowed".to_string()));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part;123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part;123"));
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_display_keeps_parameter_order() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("format", "flowed")
            .with_parameter("charset", "utf-8");
        assert_eq!(ct.to_string(), "text/plain; format=flowed; charset=utf-8");
    }

    #[test]
    fn test_display_quotes_specials() {
        let ct = ContentType::multipart_mixed().with_parameter("boundary", "--_MwP-ab-Part_1");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"--_MwP-ab-Part_1\"");
    }

    #[test]
    fn test_rfc2231_single() {
        let ct = ContentType::new("application", "pdf").with_parameter("name", "résumé.pdf");
        assert_eq!(
            ct.to_string(),
            "application/pdf; name*=utf-8''r%C3%A9sum%C3%A9.pdf"
        );
    }

    #[test]
    fn test_rfc2231_continuations() {
        let name = "ü".repeat(20);
        let rendered = format_structured("attachment", &[("filename".into(), name)]);
        assert!(rendered.starts_with("attachment; filename*0*=utf-8''%C3%BC"));
        assert!(rendered.contains("; filename*1*=%C3%BC"));
        for part in rendered.split("; ").skip(1) {
            let value = part.split_once('=').unwrap().1;
            assert!(value.len() <= MAX_PARAM_LENGTH);
        }
    }

    #[test]
    fn test_long_ascii_parameter() {
        let name = "a".repeat(60);
        let rendered = format_structured("attachment", &[("filename".into(), name)]);
        assert_eq!(
            rendered,
            format!(
                "attachment; filename*0=\"{}\"; filename*1=\"{}\"",
                "a".repeat(50),
                "a".repeat(10)
            )
        );
    }
}
