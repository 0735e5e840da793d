//! Email address types.

use crate::error::{Error, ErrorKind, Result};
use mailwright_mime::address::normalize_address;

/// Email address for the SMTP envelope.
///
/// The domain is lowercased and IDNA-encoded on construction; the local
/// part is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an `EENVELOPE` error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let addr = addr.trim();
        Self::validate(addr)?;
        Ok(Self(normalize_address(addr)))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the address needs the `SMTPUTF8` extension.
    #[must_use]
    pub fn is_international(&self) -> bool {
        !self.0.is_ascii()
    }

    /// Validates an email address (basic validation).
    fn validate(addr: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::new(
                ErrorKind::Envelope,
                format!("Invalid address {addr:?}: {reason}"),
            ))
        };

        if addr.is_empty() {
            return invalid("address cannot be empty");
        }

        if addr.chars().any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>') {
            return invalid("address contains forbidden characters");
        }

        let Some((local, domain)) = addr.rsplit_once('@') else {
            return invalid("address must contain @");
        };

        if local.is_empty() || domain.is_empty() {
            return invalid("local and domain parts cannot be empty");
        }

        Ok(())
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert!(!addr.is_international());
    }

    #[test]
    fn test_domain_is_normalized() {
        let addr = Address::new("User@JÕGEVA.ee").unwrap();
        assert_eq!(addr.as_str(), "User@xn--jgeva-dua.ee");
        assert!(!addr.is_international());
    }

    #[test]
    fn test_international_local_part() {
        let addr = Address::new("jürgen@example.com").unwrap();
        assert!(addr.is_international());
    }

    #[test]
    fn test_invalid_address_no_at() {
        let err = Address::new("userexample.com").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Envelope);
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_invalid_address_empty_local() {
        assert!(Address::new("@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty_domain() {
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn test_invalid_address_injection() {
        assert!(Address::new("a@example.com>\r\nRCPT TO:<b@example.com").is_err());
        assert!(Address::new("a b@example.com").is_err());
    }
}
