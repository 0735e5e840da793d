//! MIME header handling.

use crate::error::{Error, Result};

/// Ordered collection of email headers.
///
/// Header names are stored in canonical form (`message-id` becomes
/// `Message-ID`) and compared case-insensitively. Insertion order is kept so
/// output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

/// Canonical spelling of a header name.
///
/// Each dash-separated part is capitalized; a few well-known acronyms are
/// upper-cased (`MIME-Version`, `Message-ID`, `Content-MD5`).
#[must_use]
pub fn normalize_key(name: &str) -> String {
    let name = name.replace(['\r', '\n'], " ");
    let lower = name.trim().to_lowercase();
    if lower == "x-smtpapi" {
        return "X-SMTPAPI".to_string();
    }

    let parts: Vec<&str> = lower.split('-').collect();
    let last = parts.len() - 1;
    parts
        .iter()
        .enumerate()
        .map(|(idx, part)| {
            let upper = (idx == 0 && matches!(*part, "mime" | "dkim" | "arc" | "bimi"))
                || (idx == last && idx > 0 && matches!(*part, "spf" | "fbl" | "id" | "md5"));
            if upper {
                return part.to_uppercase();
            }
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header value, keeping existing values.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((normalize_key(name), value.into()));
    }

    /// Sets a header value.
    ///
    /// The first existing occurrence is overwritten in place and any further
    /// occurrences are removed; a new header is appended otherwise.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = normalize_key(name);
        let value = value.into();
        match self.position(&key) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut idx = 0;
                self.entries.retain(|(name, _)| {
                    let keep = idx <= first || !name.eq_ignore_ascii_case(&key);
                    idx += 1;
                    keep
                });
            }
            None => self.entries.push((key, value)),
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    /// Gets all values for a header, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Returns true if at least one value exists for the header.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        let name = name.trim();
        self.entries
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no headers are set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Parses a header block, stopping at the first empty line.
    ///
    /// Folded continuation lines are unfolded with a single space.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-continuation line has no colon.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(&name, value);
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHeader(line.to_string()))?;
            current = Some((name.trim().to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(&name, value);
        }

        Ok(headers)
    }
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
    fn test_normalize_key() {
        assert_eq!(normalize_key("content-type"), "Content-Type");
        assert_eq!(normalize_key("MESSAGE-ID"), "Message-ID");
        assert_eq!(normalize_key("mime-version"), "MIME-Version");
        assert_eq!(normalize_key("content-md5"), "Content-MD5");
        assert_eq!(normalize_key("x-mailer"), "X-Mailer");
        assert_eq!(normalize_key("id"), "Id");
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_set_overwrites_first_and_removes_rest() {
        let mut headers = Headers::new();
        headers.add("X-First", "1");
        headers.add("To", "alice@example.com");
        headers.add("X-Middle", "2");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("to", "charlie@example.com");
        let order: Vec<_> = headers.iter().collect();
        assert_eq!(
            order,
            vec![
                ("X-First", "1"),
                ("To", "charlie@example.com"),
                ("X-Middle", "2"),
            ]
        );
    }

    #[test]
    fn test_set_appends_when_missing() {
        let mut headers = Headers::new();
        headers.set("Subject", "Hi");
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("SUBJECT"));
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.add("Subject", "Again");
        headers.remove("subject");
        assert!(headers.get("Subject").is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_headers_parse_invalid() {
        assert!(matches!(
            Headers::parse("no colon here"),
            Err(Error::InvalidHeader(_))
        ));
    }
}
