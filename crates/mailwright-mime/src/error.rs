//! Error types for MIME operations.

use std::io;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid MIME header.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid email address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Node id does not belong to this tree.
    #[error("Unknown node: {0}")]
    UnknownNode(usize),

    /// Content reader failed while streaming.
    #[error("Content stream error: {0}")]
    Stream(#[from] io::Error),

    /// Reader content was already consumed by an earlier streaming pass.
    #[error("Content of node {0} was already streamed")]
    ContentConsumed(usize),
}
