//! MIME tree builder.
//!
//! A message is an arena of nodes addressed by [`NodeId`]. The root is node
//! 1; multipart nodes carry children, every other node is a leaf with
//! content. Streaming walks the tree depth-first and writes RFC 5322 output
//! with CRLF line endings, encoding leaf content on the fly.

use crate::address::{format_addresses, normalize_address, parse_addresses, parse_mailboxes};
use crate::content_type::{ContentType, format_structured};
use crate::encoding::{
    BodyEncoder, MAX_LINE_LENGTH, TransferEncoding, WordEncoding, encode_words, fold_lines,
    has_longer_lines, is_plain_text,
};
use crate::error::{Error, Result};
use crate::header::{Headers, normalize_key};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default prefix of generated multipart boundaries.
pub const DEFAULT_BOUNDARY_PREFIX: &str = "--_MwP";

/// Read size for reader content and the in-memory pipe of [`MessageReader`].
const CHUNK_SIZE: usize = 64 * 1024;

const ADDRESS_HEADERS: [&str; 6] = ["From", "Sender", "To", "Cc", "Bcc", "Reply-To"];

/// Handle to a node of a [`MimeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// 1-based node number, used in generated boundaries.
    #[must_use]
    pub const fn number(self) -> usize {
        self.0 + 1
    }
}

/// Leaf content.
pub enum Content {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Streamed content, consumed by the first streaming pass.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Content {
    /// Wraps an async reader.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Options shared by every node of a tree.
#[derive(Debug, Clone)]
pub struct MimeOptions {
    /// Random part of generated boundaries; generated when `None`.
    pub base_boundary: Option<String>,
    /// Prefix of generated boundaries.
    pub boundary_prefix: String,
    /// Domain for Message-ID when the sender has none.
    pub hostname: Option<String>,
    /// Emit the `Bcc` header instead of dropping it.
    pub keep_bcc: bool,
    /// Forces `Q` or `B` for header words and text bodies.
    pub text_encoding: Option<WordEncoding>,
}

impl Default for MimeOptions {
    fn default() -> Self {
        Self {
            base_boundary: None,
            boundary_prefix: DEFAULT_BOUNDARY_PREFIX.to_string(),
            hostname: None,
            keep_bcc: false,
            text_encoding: None,
        }
    }
}

/// SMTP envelope derived from the root headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageEnvelope {
    /// Sender address.
    pub from: Option<String>,
    /// Recipient addresses, de-duplicated.
    pub to: Vec<String>,
}

#[derive(Debug)]
struct Node {
    content_type: ContentType,
    headers: Headers,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    content: Option<Content>,
    consumed: bool,
    transfer_encoding: Option<TransferEncoding>,
    text_encoding: Option<WordEncoding>,
    filename: Option<String>,
}

impl Node {
    fn new(content_type: ContentType, parent: Option<NodeId>) -> Self {
        Self {
            content_type,
            headers: Headers::new(),
            parent,
            children: Vec::new(),
            content: None,
            consumed: false,
            transfer_encoding: None,
            text_encoding: None,
            filename: None,
        }
    }
}

enum Step {
    Open(NodeId),
    Delimiter { boundary: String, first: bool },
    Close(String),
}

/// A MIME message under construction.
#[derive(Debug)]
pub struct MimeTree {
    nodes: Vec<Node>,
    base_boundary: String,
    options: MimeOptions,
}

impl MimeTree {
    /// Creates a tree whose root has the given content type.
    #[must_use]
    pub fn new(content_type: ContentType) -> Self {
        Self::with_options(content_type, MimeOptions::default())
    }

    /// Creates a tree with explicit options.
    #[must_use]
    pub fn with_options(content_type: ContentType, options: MimeOptions) -> Self {
        let base_boundary = options
            .base_boundary
            .clone()
            .unwrap_or_else(|| hex::encode(rand::random::<[u8; 8]>()));
        Self {
            nodes: vec![Node::new(content_type, None)],
            base_boundary,
            options,
        }
    }

    /// The root node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.number()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(Error::UnknownNode(id.number()))
    }

    /// Appends a child to a multipart node.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown or not multipart.
    pub fn create_child(&mut self, parent: NodeId, content_type: ContentType) -> Result<NodeId> {
        let node = self.node(parent)?;
        if !node.content_type.is_multipart() {
            return Err(Error::InvalidContentType(format!(
                "node {} is {}, not multipart",
                parent.number(),
                node.content_type.mime_type()
            )));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(content_type, Some(parent)));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Children of a node, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Parent of a node (`None` for the root).
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Content type of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn content_type(&self, id: NodeId) -> Result<&ContentType> {
        Ok(&self.node(id)?.content_type)
    }

    /// Boundary of a multipart node: the caller's `boundary` parameter if
    /// set, else `<prefix>-<base>-Part_<n>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn boundary(&self, id: NodeId) -> Result<Option<String>> {
        let node = self.node(id)?;
        Ok(node
            .content_type
            .is_multipart()
            .then(|| self.boundary_of(node, id)))
    }

    fn boundary_of(&self, node: &Node, id: NodeId) -> String {
        node.content_type.boundary().map_or_else(
            || {
                format!(
                    "{}-{}-Part_{}",
                    self.options.boundary_prefix,
                    self.base_boundary,
                    id.number()
                )
            },
            str::to_string,
        )
    }

    /// Sets a header, overwriting the first occurrence and removing the rest.
    ///
    /// `Content-Type` and `Content-Transfer-Encoding` update the node's
    /// structured fields instead of the header list.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or a new Content-Type is
    /// invalid for the node.
    pub fn set_header(&mut self, id: NodeId, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let node = self.node_mut(id)?;
        match normalize_key(key).as_str() {
            "Content-Type" => {
                let content_type = ContentType::parse(&value)?;
                if !node.children.is_empty() && !content_type.is_multipart() {
                    return Err(Error::InvalidContentType(format!(
                        "node {} has children, {} is not multipart",
                        id.number(),
                        content_type.mime_type()
                    )));
                }
                node.content_type = content_type;
            }
            "Content-Transfer-Encoding" => {
                node.transfer_encoding = Some(TransferEncoding::parse(&value));
            }
            _ => node.headers.set(key, value),
        }
        Ok(())
    }

    /// Appends a header, keeping existing values.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn add_header(&mut self, id: NodeId, key: &str, value: impl Into<String>) -> Result<()> {
        match normalize_key(key).as_str() {
            "Content-Type" | "Content-Transfer-Encoding" => self.set_header(id, key, value),
            _ => {
                self.node_mut(id)?.headers.add(key, value);
                Ok(())
            }
        }
    }

    /// First value of a header as set by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn get_header(&self, id: NodeId, key: &str) -> Result<Option<&str>> {
        Ok(self.node(id)?.headers.get(key))
    }

    /// Removes every value of a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn remove_header(&mut self, id: NodeId, key: &str) -> Result<()> {
        let node = self.node_mut(id)?;
        if normalize_key(key) == "Content-Transfer-Encoding" {
            node.transfer_encoding = None;
        }
        node.headers.remove(key);
        Ok(())
    }

    /// Sets leaf content.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or multipart.
    pub fn set_content(&mut self, id: NodeId, content: impl Into<Content>) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.content_type.is_multipart() {
            return Err(Error::InvalidContentType(format!(
                "node {} is multipart and cannot carry content",
                id.number()
            )));
        }
        node.content = Some(content.into());
        node.consumed = false;
        Ok(())
    }

    /// Forces the transfer encoding of a leaf.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn set_transfer_encoding(&mut self, id: NodeId, encoding: TransferEncoding) -> Result<()> {
        self.node_mut(id)?.transfer_encoding = Some(encoding);
        Ok(())
    }

    /// Forces `Q` or `B` for this node's headers and text content.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn set_text_encoding(&mut self, id: NodeId, encoding: WordEncoding) -> Result<()> {
        self.node_mut(id)?.text_encoding = Some(encoding);
        Ok(())
    }

    /// Marks a leaf as an attachment with the given file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn set_filename(&mut self, id: NodeId, filename: impl Into<String>) -> Result<()> {
        let filename = filename.into();
        let node = self.node_mut(id)?;
        node.content_type.set_parameter("name", filename.clone());
        node.filename = Some(filename);
        Ok(())
    }

    /// Sets the `Content-ID` of a leaf (angle brackets are added).
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn set_content_id(&mut self, id: NodeId, content_id: impl Into<String>) -> Result<()> {
        self.node_mut(id)?.headers.set("Content-ID", content_id);
        Ok(())
    }

    /// Derives the SMTP envelope from the root headers.
    ///
    /// `from` is the first address of `From`, else `Reply-To`, else
    /// `Sender`. `to` is the union of `To`, `Cc` and `Bcc`. Domains are
    /// punycode-normalized.
    #[must_use]
    pub fn envelope(&self) -> MessageEnvelope {
        let headers = &self.nodes[0].headers;

        let first_address = |key: &str| {
            headers
                .get_all(key)
                .into_iter()
                .flat_map(parse_mailboxes)
                .find(|mailbox| !mailbox.address.is_empty())
                .map(|mailbox| normalize_address(&mailbox.address))
        };
        let from = first_address("From")
            .or_else(|| first_address("Reply-To"))
            .or_else(|| first_address("Sender"));

        let mut to: Vec<String> = Vec::new();
        for key in ["To", "Cc", "Bcc"] {
            for value in headers.get_all(key) {
                for mailbox in parse_mailboxes(value) {
                    if mailbox.address.is_empty() {
                        continue;
                    }
                    let address = normalize_address(&mailbox.address);
                    if !to.contains(&address) {
                        to.push(address);
                    }
                }
            }
        }

        MessageEnvelope { from, to }
    }

    /// Returns the root Message-ID, generating it if absent.
    pub fn message_id(&mut self) -> String {
        self.ensure_root_defaults();
        self.nodes[0]
            .headers
            .get("Message-ID")
            .map(ensure_angle)
            .unwrap_or_default()
    }

    fn ensure_root_defaults(&mut self) {
        let domain = self
            .envelope()
            .from
            .and_then(|from| from.rsplit_once('@').map(|(_, domain)| domain.to_string()))
            .or_else(|| self.options.hostname.clone())
            .unwrap_or_else(|| "localhost".to_string());

        let headers = &mut self.nodes[0].headers;
        if !headers.contains("Date") {
            let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S +0000");
            headers.add("Date", date.to_string());
        }
        if !headers.contains("Message-ID") {
            headers.add("Message-ID", generate_message_id(&domain));
        }
        if !headers.contains("MIME-Version") {
            headers.add("MIME-Version", "1.0");
        }
    }

    fn leaf_encoding(&self, node: &Node) -> TransferEncoding {
        if let Some(encoding) = node.transfer_encoding {
            return encoding;
        }
        if !node.content_type.is_text() {
            return TransferEncoding::Base64;
        }

        let preferred = node.text_encoding.or(self.options.text_encoding);
        let for_text = |text: &str| {
            if is_plain_text(text) && !has_longer_lines(text, MAX_LINE_LENGTH) {
                TransferEncoding::SevenBit
            } else {
                TransferEncoding::from_word_encoding(
                    preferred.unwrap_or_else(|| WordEncoding::select(text)),
                )
            }
        };

        match &node.content {
            Some(Content::Text(text)) => for_text(text),
            Some(Content::Bytes(bytes)) => {
                std::str::from_utf8(bytes).map_or(TransferEncoding::Base64, for_text)
            }
            Some(Content::Reader(_)) => preferred.map_or(
                TransferEncoding::QuotedPrintable,
                TransferEncoding::from_word_encoding,
            ),
            None => TransferEncoding::SevenBit,
        }
    }

    fn render_headers(&self, id: NodeId, encoding: Option<TransferEncoding>) -> String {
        let node = &self.nodes[id.0];
        let text_encoding = node.text_encoding.or(self.options.text_encoding);

        let mut content_type = node.content_type.clone();
        if content_type.is_multipart() && content_type.boundary().is_none() {
            content_type.set_parameter("boundary", self.boundary_of(node, id));
        }
        if content_type.is_text() && content_type.charset().is_none() {
            content_type.set_parameter("charset", "utf-8");
        }

        let mut lines = vec![format!("Content-Type: {content_type}")];
        if let Some(encoding) = encoding {
            lines.push(format!("Content-Transfer-Encoding: {encoding}"));
        }
        if let Some(filename) = &node.filename {
            if !node.headers.contains("Content-Disposition") {
                let params = [("filename".to_string(), filename.clone())];
                lines.push(format!(
                    "Content-Disposition: {}",
                    format_structured("attachment", &params)
                ));
            }
        }
        for (key, value) in node.headers.iter() {
            if let Some(value) = self.render_value(key, value, text_encoding) {
                lines.push(format!("{key}: {value}"));
            }
        }

        let mut out = String::new();
        for line in lines {
            out.push_str(&fold_lines(&line, MAX_LINE_LENGTH));
            out.push_str("\r\n");
        }
        out
    }

    fn render_value(
        &self,
        key: &str,
        value: &str,
        encoding: Option<WordEncoding>,
    ) -> Option<String> {
        let value = value.replace("\r\n", " ").replace(['\r', '\n'], " ");
        match key {
            "Bcc" if !self.options.keep_bcc => None,
            key if ADDRESS_HEADERS.contains(&key) => {
                let rendered = format_addresses(&parse_addresses(&value), encoding);
                (!rendered.is_empty()).then_some(rendered)
            }
            "Message-ID" | "In-Reply-To" | "Content-ID" => Some(ensure_angle(&value)),
            "References" => Some(
                value
                    .split_whitespace()
                    .map(ensure_angle)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            "Date" | "MIME-Version" => Some(value),
            _ => Some(encode_words(&value, encoding)),
        }
    }

    /// Streams the message into `out`.
    ///
    /// Root defaults (`Date`, `Message-ID`, `MIME-Version`) are generated on
    /// the first call and reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if a content reader or `out` fails, and
    /// `Error::ContentConsumed` if reader content was already streamed.
    pub async fn write_to<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.ensure_root_defaults();
        debug!(nodes = self.nodes.len(), "streaming message");

        let mut stack = vec![Step::Open(self.root())];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => self.write_node(id, out, &mut stack).await?,
                Step::Delimiter { boundary, first } => {
                    let separator = if first { "" } else { "\r\n" };
                    out.write_all(format!("{separator}--{boundary}\r\n").as_bytes())
                        .await?;
                }
                Step::Close(boundary) => {
                    out.write_all(format!("\r\n--{boundary}--\r\n").as_bytes())
                        .await?;
                }
            }
        }

        out.flush().await?;
        Ok(())
    }

    async fn write_node<W>(&mut self, id: NodeId, out: &mut W, stack: &mut Vec<Step>) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (multipart, consumed) = {
            let node = &self.nodes[id.0];
            (node.content_type.is_multipart(), node.consumed)
        };

        if multipart {
            let headers = self.render_headers(id, None);
            {
                let node = &self.nodes[id.0];
                let boundary = self.boundary_of(node, id);
                stack.push(Step::Close(boundary.clone()));
                for (idx, child) in node.children.iter().enumerate().rev() {
                    stack.push(Step::Open(*child));
                    stack.push(Step::Delimiter {
                        boundary: boundary.clone(),
                        first: idx == 0,
                    });
                }
            }
            out.write_all(headers.as_bytes()).await?;
            out.write_all(b"\r\n").await?;
            return Ok(());
        }

        if consumed {
            return Err(Error::ContentConsumed(id.number()));
        }

        let encoding = self.leaf_encoding(&self.nodes[id.0]);
        let headers = self.render_headers(id, Some(encoding));
        out.write_all(headers.as_bytes()).await?;
        out.write_all(b"\r\n").await?;

        let mut encoder = BodyEncoder::new(encoding);
        let mut buf = Vec::new();
        let reader = {
            let node = &mut self.nodes[id.0];
            match node.content.take() {
                Some(Content::Reader(reader)) => {
                    node.consumed = true;
                    Some(reader)
                }
                other => {
                    match &other {
                        Some(Content::Text(text)) => encoder.update(text.as_bytes(), &mut buf),
                        Some(Content::Bytes(bytes)) => encoder.update(bytes, &mut buf),
                        Some(Content::Reader(_)) | None => {}
                    }
                    node.content = other;
                    None
                }
            }
        };

        if let Some(mut reader) = reader {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let read = reader.read(&mut chunk).await.map_err(|e| {
                    warn!(node = id.number(), error = %e, "content reader failed");
                    Error::Stream(e)
                })?;
                if read == 0 {
                    break;
                }
                encoder.update(&chunk[..read], &mut buf);
                out.write_all(&buf).await?;
                buf.clear();
            }
        }

        encoder.finish(&mut buf);
        out.write_all(&buf).await?;
        Ok(())
    }

    /// Streams the message into a byte vector.
    ///
    /// # Errors
    ///
    /// Same as [`MimeTree::write_to`].
    pub async fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out).await?;
        Ok(out)
    }

    /// Streams the message on a background task and returns a reader over
    /// the output.
    ///
    /// A streaming failure is reported as an I/O error once the output ends.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn into_reader(mut self) -> MessageReader {
        let (mut writer, reader) = tokio::io::duplex(CHUNK_SIZE);
        let task = tokio::spawn(async move { self.write_to(&mut writer).await });
        MessageReader {
            inner: reader,
            task: Some(task),
        }
    }
}

fn ensure_angle(value: &str) -> String {
    let id = value.trim().trim_start_matches('<').trim_end_matches('>');
    format!("<{id}>")
}

fn generate_message_id(domain: &str) -> String {
    let id = hex::encode(rand::random::<[u8; 16]>());
    format!(
        "<{}-{}-{}-{}-{}@{domain}>",
        &id[..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..]
    )
}

/// Reader over a message streamed by [`MimeTree::into_reader`].
#[derive(Debug)]
pub struct MessageReader {
    inner: DuplexStream,
    task: Option<JoinHandle<Result<()>>>,
}

impl AsyncRead for MessageReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if buf.filled().len() > before {
            return Poll::Ready(Ok(()));
        }

        // End of output: surface how the streaming task ended
        if let Some(task) = this.task.as_mut() {
            let outcome = ready!(Pin::new(task).poll(cx));
            this.task = None;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(Error::Stream(e))) => return Poll::Ready(Err(e)),
                Ok(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                Err(e) => return Poll::Ready(Err(io::Error::other(e))),
            }
        }
        Poll::Ready(Ok(()))
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

    fn options() -> MimeOptions {
        MimeOptions {
            base_boundary: Some("abc123".to_string()),
            ..MimeOptions::default()
        }
    }

    async fn render(tree: &mut MimeTree) -> String {
        String::from_utf8(tree.to_bytes().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_single_text_leaf() {
        let mut tree = MimeTree::new(ContentType::new("text", "plain"));
        let root = tree.root();
        tree.set_header(root, "subject", "Hello").unwrap();
        tree.set_content(root, "Hi there\nBye").unwrap();

        let out = render(&mut tree).await;
        assert!(out.starts_with(
            "Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 7bit\r\nSubject: Hello\r\n"
        ));
        assert!(out.contains("\r\nMIME-Version: 1.0\r\n"));
        assert!(out.contains("\r\nDate: "));
        assert!(out.ends_with("\r\n\r\nHi there\r\nBye"));
    }

    #[tokio::test]
    async fn test_generated_defaults_are_stable() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        tree.set_content(tree.root(), "x").unwrap();
        let first = tree.to_bytes().await.unwrap();
        let second = tree.to_bytes().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_message_id_domain() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        tree.set_header(tree.root(), "From", "Jane <jane@Example.COM>").unwrap();
        let id = tree.message_id();
        assert!(id.ends_with("@example.com>"));
        let local = id.trim_start_matches('<').split('@').next().unwrap();
        let groups: Vec<usize> = local.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);

        let mut tree = MimeTree::with_options(
            ContentType::text_plain(),
            MimeOptions {
                hostname: Some("mx.local".into()),
                ..MimeOptions::default()
            },
        );
        assert!(tree.message_id().ends_with("@mx.local>"));

        let mut tree = MimeTree::new(ContentType::text_plain());
        assert!(tree.message_id().ends_with("@localhost>"));
    }

    #[test]
    fn test_boundary_format() {
        let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), options());
        let child = tree
            .create_child(tree.root(), ContentType::multipart_alternative())
            .unwrap();
        assert_eq!(
            tree.boundary(tree.root()).unwrap().as_deref(),
            Some("--_MwP-abc123-Part_1")
        );
        assert_eq!(
            tree.boundary(child).unwrap().as_deref(),
            Some("--_MwP-abc123-Part_2")
        );

        tree.set_header(child, "Content-Type", "multipart/alternative; boundary=mine")
            .unwrap();
        assert_eq!(tree.boundary(child).unwrap().as_deref(), Some("mine"));
    }

    #[test]
    fn test_create_child_requires_multipart() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        let err = tree
            .create_child(tree.root(), ContentType::text_plain())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(_)));
    }

    #[test]
    fn test_unknown_node() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        let mut other = MimeTree::with_options(ContentType::multipart_mixed(), options());
        let foreign = other
            .create_child(other.root(), ContentType::text_plain())
            .unwrap();
        assert!(matches!(
            tree.set_content(foreign, "x"),
            Err(Error::UnknownNode(2))
        ));
    }

    #[tokio::test]
    async fn test_multipart_layout() {
        let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), options());
        let root = tree.root();
        let text = tree.create_child(root, ContentType::text_plain()).unwrap();
        tree.set_content(text, "one").unwrap();
        let data = tree
            .create_child(root, ContentType::new("application", "octet-stream"))
            .unwrap();
        tree.set_content(data, vec![0u8, 1, 2]).unwrap();

        let out = render(&mut tree).await;
        let b = "--_MwP-abc123-Part_1";
        assert!(out.starts_with(&format!("Content-Type: multipart/mixed; boundary=\"{b}\"\r\n")));
        assert!(out.contains(&format!("\r\n\r\n--{b}\r\nContent-Type: text/plain; charset=utf-8\r\n")));
        assert!(out.contains(&format!("\r\n\r\none\r\n--{b}\r\n")));
        assert!(out.contains("Content-Transfer-Encoding: base64\r\n\r\nAAEC"));
        assert!(out.ends_with(&format!("AAEC\r\n--{b}--\r\n")));
    }

    #[tokio::test]
    async fn test_text_encoding_choice() {
        let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), options());
        let root = tree.root();
        let latin = tree.create_child(root, ContentType::text_plain()).unwrap();
        tree.set_content(latin, "Grüße aus Köln").unwrap();
        let cjk = tree.create_child(root, ContentType::text_plain()).unwrap();
        tree.set_content(cjk, "你好世界").unwrap();
        let long = tree.create_child(root, ContentType::text_plain()).unwrap();
        tree.set_content(long, "a ".repeat(60)).unwrap();
        let forced = tree.create_child(root, ContentType::text_plain()).unwrap();
        tree.set_content(forced, "plain").unwrap();
        tree.set_transfer_encoding(forced, TransferEncoding::Base64).unwrap();

        let out = render(&mut tree).await;
        let encodings: Vec<&str> = out
            .lines()
            .filter_map(|line| line.strip_prefix("Content-Transfer-Encoding: "))
            .collect();
        assert_eq!(
            encodings,
            vec!["quoted-printable", "base64", "quoted-printable", "base64"]
        );
        assert!(out.contains("Gr=C3=BC=C3=9Fe aus K=C3=B6ln"));
    }

    #[tokio::test]
    async fn test_header_rendering() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        let root = tree.root();
        tree.set_header(root, "From", "\"Doe, Jane\" <jane@example.com>").unwrap();
        tree.set_header(root, "To", "bob@jõgeva.ee").unwrap();
        tree.set_header(root, "Bcc", "hidden@example.com").unwrap();
        tree.set_header(root, "Subject", "Grüße").unwrap();
        tree.set_header(root, "In-Reply-To", "abc@example.com").unwrap();
        tree.set_header(root, "References", "a@x <b@x>").unwrap();
        tree.set_header(root, "X-Injected", "one\r\nBcc: evil@example.com").unwrap();

        let out = render(&mut tree).await;
        assert!(out.contains("\r\nFrom: \"Doe, Jane\" <jane@example.com>\r\n"));
        assert!(out.contains("\r\nTo: bob@xn--jgeva-dua.ee\r\n"));
        assert!(!out.contains("hidden@example.com"));
        assert!(out.contains("\r\nSubject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\r\n"));
        assert!(out.contains("\r\nIn-Reply-To: <abc@example.com>\r\n"));
        assert!(out.contains("\r\nReferences: <a@x> <b@x>\r\n"));
        assert!(out.contains("\r\nX-Injected: one Bcc: evil@example.com\r\n"));
    }

    #[tokio::test]
    async fn test_keep_bcc() {
        let mut tree = MimeTree::with_options(
            ContentType::text_plain(),
            MimeOptions {
                keep_bcc: true,
                ..MimeOptions::default()
            },
        );
        tree.set_header(tree.root(), "Bcc", "hidden@example.com").unwrap();
        assert!(render(&mut tree).await.contains("\r\nBcc: hidden@example.com\r\n"));
    }

    #[tokio::test]
    async fn test_attachment_headers() {
        let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), options());
        let file = tree
            .create_child(tree.root(), ContentType::new("application", "pdf"))
            .unwrap();
        tree.set_filename(file, "report.pdf").unwrap();
        tree.set_content_id(file, "report@local").unwrap();
        tree.set_content(file, b"%PDF".as_slice()).unwrap();

        let out = render(&mut tree).await;
        assert!(out.contains("Content-Type: application/pdf; name=report.pdf\r\n"));
        assert!(out.contains("Content-Disposition: attachment; filename=report.pdf\r\n"));
        assert!(out.contains("Content-ID: <report@local>\r\n"));
    }

    #[test]
    fn test_envelope() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        let root = tree.root();
        tree.set_header(root, "Reply-To", "reply@example.com").unwrap();
        tree.set_header(root, "To", "A <a@Example.com>, b@example.com").unwrap();
        tree.set_header(root, "Cc", "a@example.com, Team: c@example.com;").unwrap();
        tree.set_header(root, "Bcc", "d@example.com").unwrap();

        let envelope = tree.envelope();
        assert_eq!(envelope.from.as_deref(), Some("reply@example.com"));
        assert_eq!(
            envelope.to,
            vec!["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );

        tree.set_header(root, "From", "from@example.com").unwrap();
        assert_eq!(tree.envelope().from.as_deref(), Some("from@example.com"));
    }

    #[tokio::test]
    async fn test_reader_content_is_consumed_once() {
        let mut tree = MimeTree::new(ContentType::text_plain());
        tree.set_content(tree.root(), Content::reader(&b"line one\nline two"[..]))
            .unwrap();

        let out = render(&mut tree).await;
        assert!(out.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(out.ends_with("\r\n\r\nline one\r\nline two"));

        assert!(matches!(
            tree.to_bytes().await,
            Err(Error::ContentConsumed(1))
        ));
    }

    #[tokio::test]
    async fn test_into_reader_matches_to_bytes() {
        let build = || {
            let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), options());
            let root = tree.root();
            tree.set_header(root, "Date", "Mon, 19 Oct 2026 10:00:00 +0000").unwrap();
            tree.set_header(root, "Message-ID", "<fixed@example.com>").unwrap();
            let leaf = tree.create_child(root, ContentType::text_plain()).unwrap();
            tree.set_content(leaf, "body").unwrap();
            tree
        };

        let expected = build().to_bytes().await.unwrap();
        let mut streamed = Vec::new();
        build()
            .into_reader()
            .read_to_end(&mut streamed)
            .await
            .unwrap();
        assert_eq!(streamed, expected);
    }
}
