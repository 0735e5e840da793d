//! # mailwright-smtp
//!
//! An SMTP client (RFC 5321) that streams messages produced by
//! `mailwright-mime`.
//!
//! ## Features
//!
//! - **Explicit session state machine**: every reply is matched against the
//!   command that triggered it and validated against the protocol phase
//! - **TLS**: implicit TLS (port 465) and STARTTLS, optionally opportunistic
//! - **Authentication**: PLAIN, LOGIN, XOAUTH2
//! - **Extensions**: SIZE, 8BITMIME, SMTPUTF8, DSN (PIPELINING is recognized;
//!   recipients are still sent one at a time)
//! - **Streaming DATA**: any `AsyncRead` is dot-stuffed and CRLF-normalized
//!   on the fly
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwright_mime::{ContentType, MimeTree};
//! use mailwright_smtp::{Client, Credentials, Envelope, SmtpConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut tree = MimeTree::new(ContentType::text_plain());
//!     let root = tree.root();
//!     tree.set_header(root, "From", "sender@example.com")?;
//!     tree.set_header(root, "To", "recipient@example.com")?;
//!     tree.set_header(root, "Subject", "Test")?;
//!     tree.set_content(root, "Hello, World!")?;
//!
//!     let envelope = Envelope::try_from(tree.envelope())?;
//!     let mut message = tree.into_reader();
//!
//!     let config = SmtpConfig::builder("smtp.example.com")
//!         .auth(Credentials::plain("user@example.com", "password"))
//!         .build();
//!     let mut client = Client::connect(config).await?;
//!     let info = client.send(&envelope, &mut message).await?;
//!     println!("accepted: {:?}", info.accepted);
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Session Phases
//!
//! ```text
//! Greeting ─→ Hello ─→ [StartTls ─→ Hello] ─→ Ready ─→ [Auth] ─→ Ready
//!                                              │
//!        Ready ←─ Message ←─ Data ←─ Recipients ←─ Mail ←┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Session client, configuration and DATA writer
//! - [`parser`]: Reply buffer and parser
//! - [`resolver`]: Host name resolution with a TTL cache
//! - [`types`]: Core SMTP types (addresses, envelopes, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod resolver;
pub mod types;

pub use connection::{
    AllRecipientsRejected, Client, Credentials, ServerInfo, SmtpConfig, SmtpConfigBuilder,
    TlsOptions,
};
pub use error::{Error, ErrorKind, Result};
pub use resolver::{CachedResolver, Resolved, Resolver};
pub use types::{
    Address, AuthMechanism, Dsn, DsnNotify, DsnReturn, EnhancedStatus, Envelope, Extension, Reply,
    ReplyClass, ReplyCode, SendInfo,
};

/// SMTP protocol version supported.
pub const SMTP_VERSION: &str = "SMTP/ESMTP (RFC 5321)";
