//! Envelope and delivery result types.

use std::fmt::Write as _;
use std::time::Duration;

use mailwright_mime::MessageEnvelope;

use super::Address;
use crate::error::{Error, Result};

/// SMTP envelope for one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path; `None` sends the null path `<>`.
    pub from: Option<Address>,
    /// Forward paths, in order.
    pub to: Vec<Address>,
    /// Declared message size in bytes.
    pub size: Option<usize>,
    /// Delivery status notification parameters.
    pub dsn: Option<Dsn>,
    /// Requests `SMTPUTF8` even for ASCII-only addresses.
    pub use_smtputf8: bool,
}

impl Envelope {
    /// Creates an envelope with a sender and recipients.
    #[must_use]
    pub fn new(from: Option<Address>, to: Vec<Address>) -> Self {
        Self {
            from,
            to,
            ..Self::default()
        }
    }

    /// Sets the declared message size.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the DSN parameters.
    #[must_use]
    pub fn with_dsn(mut self, dsn: Dsn) -> Self {
        self.dsn = Some(dsn);
        self
    }

    /// Returns true if the transaction must be sent with `SMTPUTF8`.
    #[must_use]
    pub fn needs_smtputf8(&self) -> bool {
        self.use_smtputf8
            || self.from.as_ref().is_some_and(Address::is_international)
            || self.to.iter().any(Address::is_international)
    }
}

impl TryFrom<MessageEnvelope> for Envelope {
    type Error = Error;

    fn try_from(value: MessageEnvelope) -> Result<Self> {
        let from = value.from.map(Address::new).transpose()?;
        let to = value
            .to
            .into_iter()
            .map(Address::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(from, to))
    }
}

/// `RET=` value of a DSN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnReturn {
    /// Return the full message.
    Full,
    /// Return headers only.
    Headers,
}

impl DsnReturn {
    /// Wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Headers => "HDRS",
        }
    }
}

/// `NOTIFY=` condition of a DSN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnNotify {
    /// Never notify; exclusive with the others.
    Never,
    /// Notify on success.
    Success,
    /// Notify on failure.
    Failure,
    /// Notify on delay.
    Delay,
}

impl DsnNotify {
    /// Wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "NEVER",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Delay => "DELAY",
        }
    }
}

/// Delivery status notification request (RFC 3461).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dsn {
    /// `RET=` parameter of `MAIL FROM`.
    pub ret: Option<DsnReturn>,
    /// `ENVID=` parameter of `MAIL FROM`.
    pub envid: Option<String>,
    /// `NOTIFY=` parameter of every `RCPT TO`.
    pub notify: Vec<DsnNotify>,
    /// `ORCPT=` address of every `RCPT TO`.
    pub orcpt: Option<String>,
}

impl Dsn {
    /// Renders the `NOTIFY=` value, if any.
    ///
    /// `NEVER` suppresses every other condition.
    #[must_use]
    pub fn notify_value(&self) -> Option<String> {
        if self.notify.is_empty() {
            return None;
        }
        if self.notify.contains(&DsnNotify::Never) {
            return Some(DsnNotify::Never.as_str().to_string());
        }
        let mut values: Vec<&str> = Vec::new();
        for notify in &self.notify {
            if !values.contains(&notify.as_str()) {
                values.push(notify.as_str());
            }
        }
        Some(values.join(","))
    }
}

/// Encodes a value as RFC 3461 xtext.
#[must_use]
pub fn encode_xtext(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if (b'!'..=b'~').contains(&byte) && byte != b'+' && byte != b'=' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "+{byte:02X}");
        }
    }
    out
}

/// Outcome of a successful send.
#[derive(Debug)]
pub struct SendInfo {
    /// Recipients accepted by the server.
    pub accepted: Vec<Address>,
    /// Recipients refused by the server.
    pub rejected: Vec<Address>,
    /// Refusal for each entry in `rejected`, in the same order.
    pub rejected_errors: Vec<Error>,
    /// Final server response to the message.
    pub response: String,
    /// Time spent on the envelope commands.
    pub envelope_time: Duration,
    /// Time spent streaming the message and waiting for the final reply.
    pub message_time: Duration,
    /// Bytes written to the socket for the message, after dot stuffing.
    pub message_size: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn from_message_envelope() {
        let envelope = Envelope::try_from(MessageEnvelope {
            from: Some("jane@example.com".to_string()),
            to: vec!["bob@example.org".to_string(), "eve@example.net".to_string()],
        })
        .unwrap();
        assert_eq!(envelope.from.unwrap().as_str(), "jane@example.com");
        assert_eq!(envelope.to.len(), 2);
        assert_eq!(envelope.size, None);
    }

    #[test]
    fn from_message_envelope_rejects_bad_address() {
        let result = Envelope::try_from(MessageEnvelope {
            from: None,
            to: vec!["not-an-address".to_string()],
        });
        assert!(result.is_err());
    }

    #[test]
    fn needs_smtputf8() {
        let ascii = Envelope::new(None, vec![Address::new("a@example.com").unwrap()]);
        assert!(!ascii.needs_smtputf8());

        let intl = Envelope::new(None, vec![Address::new("jürgen@example.com").unwrap()]);
        assert!(intl.needs_smtputf8());

        let forced = Envelope {
            use_smtputf8: true,
            ..ascii
        };
        assert!(forced.needs_smtputf8());
    }

    #[test]
    fn notify_never_is_exclusive() {
        let dsn = Dsn {
            notify: vec![DsnNotify::Success, DsnNotify::Never],
            ..Dsn::default()
        };
        assert_eq!(dsn.notify_value().as_deref(), Some("NEVER"));
    }

    #[test]
    fn notify_dedupes() {
        let dsn = Dsn {
            notify: vec![DsnNotify::Failure, DsnNotify::Delay, DsnNotify::Failure],
            ..Dsn::default()
        };
        assert_eq!(dsn.notify_value().as_deref(), Some("FAILURE,DELAY"));
        assert_eq!(Dsn::default().notify_value(), None);
    }

    #[test]
    fn xtext() {
        assert_eq!(encode_xtext("rfc822;a@b.c"), "rfc822;a@b.c");
        assert_eq!(encode_xtext("a+b=c d"), "a+2Bb+3Dc+20d");
    }
}
