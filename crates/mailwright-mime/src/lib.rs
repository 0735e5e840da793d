//! # mailwright-mime
//!
//! Streaming MIME message builder.
//!
//! ## Features
//!
//! - **Tree builder**: multipart trees addressed by node id, with generated
//!   boundaries, `Date`, `Message-ID` and `MIME-Version`
//! - **Streaming**: content is encoded chunk by chunk into any `AsyncWrite`,
//!   or exposed as an `AsyncRead` for an SMTP `DATA` phase
//! - **Encoding**: Base64, Quoted-Printable, RFC 2047 encoded words, RFC 2231
//!   parameters, header folding
//! - **Addresses**: address header parsing, rendering and IDNA normalization
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwright_mime::{ContentType, MimeTree};
//!
//! let mut tree = MimeTree::new(ContentType::multipart_alternative());
//! let root = tree.root();
//! tree.set_header(root, "From", "Jane Doe <jane@example.com>")?;
//! tree.set_header(root, "To", "bob@example.org")?;
//! tree.set_header(root, "Subject", "Grüße")?;
//!
//! let text = tree.create_child(root, ContentType::text_plain())?;
//! tree.set_content(text, "Plain text version")?;
//! let html = tree.create_child(root, ContentType::text_html())?;
//! tree.set_content(html, "<p>HTML version</p>")?;
//!
//! let envelope = tree.envelope();
//! let bytes = tree.to_bytes().await?;
//! ```
//!
//! ### Encoding
//!
//! ```ignore
//! use mailwright_mime::encoding::{encode_base64, decode_base64, encode_words};
//!
//! let encoded = encode_base64(b"Hello, World!");
//! let decoded = decode_base64(&encoded)?;
//!
//! // RFC 2047 header encoding
//! let subject = encode_words("Héllo", None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod tree;

pub mod address;
pub mod encoding;

pub use address::{AddressEntry, Mailbox};
pub use content_type::ContentType;
pub use encoding::{TransferEncoding, WordEncoding};
pub use error::{Error, Result};
pub use header::Headers;
pub use tree::{
    Content, DEFAULT_BOUNDARY_PREFIX, MessageEnvelope, MessageReader, MimeOptions, MimeTree,
    NodeId,
};
