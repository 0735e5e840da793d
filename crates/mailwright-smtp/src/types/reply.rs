//! SMTP reply types.

use std::fmt;

/// A complete server reply: one code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Text of each line, without the code and separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true for `2xx`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code.class(), ReplyClass::PositiveCompletion)
    }

    /// Returns true for `3xx` (`334` during AUTH, `354` after DATA).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        matches!(self.code.class(), ReplyClass::PositiveIntermediate)
    }

    /// Returns true for `4xx`.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.code.class(), ReplyClass::TransientNegative)
    }

    /// Returns true for `5xx`.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.code.class(), ReplyClass::PermanentNegative)
    }

    /// Message lines joined with `\n`.
    #[must_use]
    pub fn text(&self) -> String {
        self.message.join("\n")
    }

    /// RFC 3463 enhanced status code leading the first line, if any.
    #[must_use]
    pub fn enhanced_status(&self) -> Option<EnhancedStatus> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
            .and_then(EnhancedStatus::parse)
    }
}

impl fmt::Display for Reply {
    /// Renders the reply in wire form, lines joined with `\n`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            return write!(f, "{}", self.code);
        }
        let last = self.message.len() - 1;
        for (idx, line) in self.message.iter().enumerate() {
            let sep = if idx == last { ' ' } else { '-' };
            write!(f, "{}{sep}{line}", self.code)?;
            if idx != last {
                f.write_str("\n")?;
            }
        }
        Ok(())
    }
}

/// First digit of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// `2xx`
    PositiveCompletion,
    /// `3xx`
    PositiveIntermediate,
    /// `4xx`
    TransientNegative,
    /// `5xx`
    PermanentNegative,
    /// Anything else; not valid SMTP.
    Unknown,
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 454 TLS not available / temporary authentication failure
    pub const TEMPORARY_FAILURE: Self = Self(454);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 552 Exceeded storage allocation
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// 554 Transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);

    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Classifies the code by its first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::PositiveCompletion,
            3 => ReplyClass::PositiveIntermediate,
            4 => ReplyClass::TransientNegative,
            5 => ReplyClass::PermanentNegative,
            _ => ReplyClass::Unknown,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Enhanced mail system status code (`class.subject.detail`, RFC 3463).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedStatus {
    /// 2, 4 or 5.
    pub class: u8,
    /// Subject, e.g. 1 for addressing.
    pub subject: u16,
    /// Detail within the subject.
    pub detail: u16,
}

impl EnhancedStatus {
    /// Parses `x.y.z`; `None` for anything else.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let class = parts.next()?.parse::<u8>().ok()?;
        let subject = parts.next()?.parse::<u16>().ok()?;
        let detail = parts.next()?.parse::<u16>().ok()?;
        if parts.next().is_some() || !matches!(class, 2 | 4 | 5) {
            return None;
        }
        Some(Self {
            class,
            subject,
            detail,
        })
    }
}

impl fmt::Display for EnhancedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn reply(code: u16, lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::new(code),
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn test_class() {
        assert_eq!(ReplyCode::OK.class(), ReplyClass::PositiveCompletion);
        assert_eq!(ReplyCode::START_DATA.class(), ReplyClass::PositiveIntermediate);
        assert_eq!(ReplyCode::TEMPORARY_FAILURE.class(), ReplyClass::TransientNegative);
        assert_eq!(ReplyCode::AUTH_FAILED.class(), ReplyClass::PermanentNegative);
        assert_eq!(ReplyCode::new(99).class(), ReplyClass::Unknown);
        assert_eq!(ReplyCode::new(600).class(), ReplyClass::Unknown);
    }

    #[test]
    fn test_reply_predicates() {
        assert!(reply(250, &["OK"]).is_success());
        assert!(reply(334, &[""]).is_intermediate());
        assert!(reply(421, &["Closing"]).is_transient());
        assert!(reply(550, &["No such user"]).is_permanent());
        assert!(!reply(550, &["No such user"]).is_success());
    }

    #[test]
    fn test_text() {
        let reply = reply(250, &["mx.example.com", "PIPELINING"]);
        assert_eq!(reply.text(), "mx.example.com\nPIPELINING");
        assert_eq!(Reply::new(ReplyCode::OK, vec![]).text(), "");
    }

    #[test]
    fn test_display_wire_form() {
        assert_eq!(reply(250, &["OK"]).to_string(), "250 OK");
        assert_eq!(
            reply(250, &["mx.example.com", "SIZE 1000", "8BITMIME"]).to_string(),
            "250-mx.example.com\n250-SIZE 1000\n250 8BITMIME"
        );
        assert_eq!(Reply::new(ReplyCode::OK, vec![]).to_string(), "250");
        assert_eq!(ReplyCode::new(42).to_string(), "042");
    }

    #[test]
    fn test_enhanced_status() {
        let status = reply(550, &["5.1.1 <bob@example.org>: user unknown"])
            .enhanced_status()
            .unwrap();
        assert_eq!(
            status,
            EnhancedStatus {
                class: 5,
                subject: 1,
                detail: 1
            }
        );
        assert_eq!(status.to_string(), "5.1.1");

        assert!(reply(250, &["OK"]).enhanced_status().is_none());
        assert!(reply(250, &[]).enhanced_status().is_none());
    }

    #[test]
    fn test_enhanced_status_rejects_malformed() {
        assert!(EnhancedStatus::parse("2.0.0").is_some());
        assert!(EnhancedStatus::parse("3.0.0").is_none());
        assert!(EnhancedStatus::parse("2.0").is_none());
        assert!(EnhancedStatus::parse("2.0.0.1").is_none());
        assert!(EnhancedStatus::parse("x.1.1").is_none());
    }
}
