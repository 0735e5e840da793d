//! Integration tests for message compilation.
//!
//! These tests build complete trees and inspect the streamed output.

#![allow(clippy::unwrap_used, clippy::needless_collect)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use proptest::prelude::*;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use mailwright_mime::encoding::{decode_quoted_printable, encode_quoted_printable};
use mailwright_mime::{Content, ContentType, MimeOptions, MimeTree};

/// Reader that yields some data, then fails.
struct FailingReader {
    sent: bool,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "source went away",
            )));
        }
        self.sent = true;
        buf.put_slice(b"partial line\n");
        Poll::Ready(Ok(()))
    }
}

fn fixed_options() -> MimeOptions {
    MimeOptions {
        base_boundary: Some("0011223344556677".to_string()),
        ..MimeOptions::default()
    }
}

#[tokio::test]
async fn test_children_produce_matching_delimiters() {
    for count in [0usize, 1, 3, 7] {
        let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), fixed_options());
        let root = tree.root();
        for idx in 0..count {
            let leaf = tree.create_child(root, ContentType::text_plain()).unwrap();
            tree.set_content(leaf, format!("part {idx}")).unwrap();
        }

        let boundary = tree.boundary(root).unwrap().unwrap();
        let out = String::from_utf8(tree.to_bytes().await.unwrap()).unwrap();
        let lines: Vec<&str> = out.split("\r\n").collect();

        let delimiter = format!("--{boundary}");
        let closing = format!("--{boundary}--");
        assert_eq!(lines.iter().filter(|l| **l == delimiter).count(), count);
        assert_eq!(lines.iter().filter(|l| **l == closing).count(), 1);
    }
}

#[tokio::test]
async fn test_nested_alternative_inside_mixed() {
    let mut tree = MimeTree::with_options(ContentType::multipart_mixed(), fixed_options());
    let root = tree.root();
    tree.set_header(root, "From", "Jane Doe <jane@example.com>").unwrap();
    tree.set_header(root, "To", "bob@example.org").unwrap();
    tree.set_header(root, "Subject", "Quarterly numbers").unwrap();

    let alternative = tree
        .create_child(root, ContentType::multipart_alternative())
        .unwrap();
    let text = tree.create_child(alternative, ContentType::text_plain()).unwrap();
    tree.set_content(text, "See attached.").unwrap();
    let html = tree.create_child(alternative, ContentType::text_html()).unwrap();
    tree.set_content(html, "<p>See attached.</p>").unwrap();

    let file = tree
        .create_child(root, ContentType::new("text", "csv"))
        .unwrap();
    tree.set_filename(file, "q3.csv").unwrap();
    tree.set_content(file, "a,b\n1,2\n").unwrap();

    let out = String::from_utf8(tree.to_bytes().await.unwrap()).unwrap();
    let outer = "--_MwP-0011223344556677-Part_1";
    let inner = "--_MwP-0011223344556677-Part_2";

    let outer_open = out.find(&format!("\r\n--{outer}\r\n")).unwrap();
    let inner_open = out.find(&format!("--{inner}\r\n")).unwrap();
    let inner_close = out.find(&format!("\r\n--{inner}--\r\n")).unwrap();
    let outer_close = out.find(&format!("\r\n--{outer}--\r\n")).unwrap();
    assert!(outer_open < inner_open);
    assert!(inner_open < inner_close);
    assert!(inner_close < outer_close);
    assert!(out.contains("Content-Disposition: attachment; filename=q3.csv\r\n"));
    assert!(out.contains("\r\n\r\na,b\r\n1,2\r\n\r\n--"));
}

#[test]
fn test_envelope_is_idempotent() {
    let mut tree = MimeTree::new(ContentType::text_plain());
    let root = tree.root();
    tree.set_header(root, "From", "Jane <jane@JÕGEVA.ee>").unwrap();
    tree.set_header(root, "To", "a@example.com, Friends: b@example.com, a@example.com;")
        .unwrap();
    tree.add_header(root, "Cc", "c@example.com").unwrap();

    let first = tree.envelope();
    let second = tree.envelope();
    assert_eq!(first, second);
    assert_eq!(first.from.as_deref(), Some("jane@xn--jgeva-dua.ee"));
    assert_eq!(first.to, vec!["a@example.com", "b@example.com", "c@example.com"]);
}

#[tokio::test]
async fn test_failing_reader_surfaces_stream_error() {
    let mut tree = MimeTree::new(ContentType::text_plain());
    tree.set_content(tree.root(), Content::reader(FailingReader { sent: false }))
        .unwrap();

    let mut reader = tree.into_reader();
    let mut out = Vec::new();
    let err = reader.read_to_end(&mut out).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn test_large_reader_content_is_wrapped() {
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let mut tree = MimeTree::new(ContentType::new("application", "octet-stream"));
    tree.set_content(tree.root(), Content::reader(io::Cursor::new(data)))
        .unwrap();

    let out = tree.to_bytes().await.unwrap();
    let text = String::from_utf8(out).unwrap();
    let body = text.split("\r\n\r\n").nth(1).unwrap();
    assert!(body.split("\r\n").all(|line| line.len() <= 76));
    assert_eq!(body.split("\r\n").next().unwrap().len(), 76);
}

proptest! {
    #[test]
    fn prop_quoted_printable_round_trip(lines in prop::collection::vec("[ -~]{0,120}", 0..8)) {
        let text = lines.join("\r\n");
        let encoded = encode_quoted_printable(text.as_bytes());
        for line in encoded.split("\r\n") {
            prop_assert!(line.len() <= 76);
        }
        let decoded = decode_quoted_printable(&encoded).unwrap();
        prop_assert_eq!(decoded, text.into_bytes());
    }
}
