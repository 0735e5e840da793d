//! Error types for SMTP operations.

use std::fmt;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error category, exposed as a stable string code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect, greeting or socket timeout (`ETIMEDOUT`).
    Timeout,
    /// Host name could not be resolved (`EDNS`).
    Dns,
    /// Socket failure, refused greeting or unexpected close (`ECONNECTION`).
    Connection,
    /// TLS handshake or STARTTLS failure (`ETLS`).
    Tls,
    /// Message refused or too large (`EMESSAGE`).
    Message,
    /// Message source failed while streaming (`ESTREAM`).
    Stream,
    /// Authentication refused (`EAUTH`).
    Auth,
    /// Sender or recipients refused (`EENVELOPE`).
    Envelope,
    /// Reply out of sequence or unusable (`EPROTOCOL`).
    Protocol,
}

impl ErrorKind {
    /// String code of this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "ETIMEDOUT",
            Self::Dns => "EDNS",
            Self::Connection => "ECONNECTION",
            Self::Tls => "ETLS",
            Self::Message => "EMESSAGE",
            Self::Stream => "ESTREAM",
            Self::Auth => "EAUTH",
            Self::Envelope => "EENVELOPE",
            Self::Protocol => "EPROTOCOL",
        }
    }

    /// Returns true if errors of this kind close the connection.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Auth | Self::Envelope | Self::Message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// SMTP error.
///
/// Carries the command that triggered it and, when the server answered,
/// the raw response and its numeric code.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    command: Option<String>,
    response: Option<String>,
    response_code: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            command: None,
            response: None,
            response_code: None,
            source: None,
        }
    }

    /// Creates an error from an I/O failure.
    #[must_use]
    pub fn io(kind: ErrorKind, context: &str, err: io::Error) -> Self {
        Self::new(kind, format!("{context}: {err}")).with_source(err)
    }

    /// Attaches the command that triggered the error (`CONN`, `EHLO`, ...).
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Attaches the raw server response; its leading digits become the
    /// response code.
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        let response = response.into();
        self.response_code = response.get(..3).and_then(|code| code.parse().ok());
        self.response = Some(response);
        self
    }

    /// Attaches an underlying error.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// String code (`ETIMEDOUT`, `EAUTH`, ...).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Command that triggered the error, if any.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Raw server response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Numeric server response code, if any.
    #[must_use]
    pub const fn response_code(&self) -> Option<u16> {
        self.response_code
    }

    /// Returns true if the connection is closed after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Returns true if the server answered with a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.response_code, Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if the server answered with a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.response_code, Some(code) if code >= 400 && code < 500)
    }
}
