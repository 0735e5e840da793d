//! SMTP response parser.
//!
//! [`ReplyBuffer`] turns raw socket chunks into complete reply strings;
//! [`parse_reply`] turns one reply string into a [`Reply`].

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};

use crate::error::{Error, ErrorKind, Result};
use crate::types::{Reply, ReplyCode};

/// Accumulates socket bytes into complete SMTP replies.
///
/// Lines end with CRLF or a bare LF; each byte is decoded as Latin-1.
/// A line that follows a `<code>-` line is joined onto the same reply with
/// a newline. Blank lines are ignored.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    partial: BytesMut,
    replies: VecDeque<String>,
}

impl ReplyBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk read from the socket.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.partial.extend_from_slice(chunk);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw = self.partial.split_to(pos + 1);
            let mut line = &raw[..pos];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let text: String = line.iter().copied().map(char::from).collect();
            self.push_line(text);
        }
    }

    fn push_line(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        if let Some(last) = self.replies.back_mut()
            && last.lines().last().is_some_and(is_continuation_line)
        {
            last.push('\n');
            last.push_str(&line);
            return;
        }
        self.replies.push_back(line);
    }

    /// Removes and returns the next complete reply.
    pub fn next_reply(&mut self) -> Option<String> {
        if self.has_reply() {
            self.replies.pop_front()
        } else {
            None
        }
    }

    /// Returns true if a complete reply is available.
    ///
    /// Only the newest reply can still be open; every earlier one was closed
    /// by the line that started its successor.
    #[must_use]
    pub fn has_reply(&self) -> bool {
        self.replies.len() > 1
            || self
                .replies
                .front()
                .and_then(|reply| reply.lines().last())
                .is_some_and(|line| !is_continuation_line(line))
    }

    /// Everything received that has not formed a complete reply.
    #[must_use]
    pub fn remainder(&self) -> String {
        let mut out: Vec<String> = self.replies.iter().cloned().collect();
        if self.partial.has_remaining() {
            out.push(self.partial.iter().copied().map(char::from).collect());
        }
        out.join("\n")
    }

    /// Drops all buffered data.
    pub fn clear(&mut self) {
        self.partial.clear();
        self.replies.clear();
    }
}

/// Returns true if the line is a `<digits>-` continuation line.
fn is_continuation_line(line: &str) -> bool {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && line.as_bytes().get(digits) == Some(&b'-')
}

/// Parses an SMTP reply string (lines joined by `\n`).
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK`
/// - Multi: `250-First line\n250-Second line\n250 Last line`
///
/// # Errors
///
/// Returns an `EPROTOCOL` error if the reply is malformed.
pub fn parse_reply(text: &str) -> Result<Reply> {
    let malformed =
        |reason: String| Error::new(ErrorKind::Protocol, reason).with_response(text.to_string());

    let lines: Vec<&str> = text.lines().collect();
    let Some(first) = lines.first() else {
        return Err(malformed("Empty reply".into()));
    };

    let Some(code_str) = first.get(0..3) else {
        return Err(malformed(format!("Reply too short: {first}")));
    };
    let code = code_str
        .parse::<u16>()
        .map_err(|_| malformed(format!("Invalid reply code: {code_str}")))?;

    let reply_code = ReplyCode::new(code);

    let mut message = Vec::new();
    for line in lines {
        if line.len() == 3 {
            message.push(String::new());
        } else if let Some(rest) = line.get(4..) {
            message.push(rest.to_string());
        } else {
            return Err(malformed(format!("Malformed reply line: {line}")));
        }
    }

    Ok(Reply::new(reply_code, message))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply("250 OK").unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = parse_reply("250-First line\n250-Second line\n250 Last line").unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.message,
            vec!["First line", "Second line", "Last line"]
        );
    }

    #[test]
    fn test_parse_greeting() {
        let reply = parse_reply("220 smtp.example.com ESMTP ready").unwrap();
        assert_eq!(reply.code.as_u16(), 220);
        assert_eq!(reply.message, vec!["smtp.example.com ESMTP ready"]);
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply("354").unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_parse_error_empty() {
        let err = parse_reply("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_parse_error_too_short() {
        assert!(parse_reply("25").is_err());
    }

    #[test]
    fn test_parse_error_invalid_code() {
        assert!(parse_reply("ABC OK").is_err());
    }

    #[test]
    fn test_buffer_joins_multiline_reply() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"250-smtp.example.com\r\n250 PIPELINING\r\n");
        assert_eq!(
            buffer.next_reply().as_deref(),
            Some("250-smtp.example.com\n250 PIPELINING")
        );
        assert_eq!(buffer.next_reply(), None);
    }

    #[test]
    fn test_buffer_waits_for_full_line() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"220 smtp.exa");
        assert!(!buffer.has_reply());
        assert_eq!(buffer.remainder(), "220 smtp.exa");
        buffer.feed(b"mple.com\n");
        assert_eq!(buffer.next_reply().as_deref(), Some("220 smtp.example.com"));
    }

    #[test]
    fn test_buffer_holds_open_multiline_reply() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"250-first\r\n");
        assert!(!buffer.has_reply());
        assert_eq!(buffer.next_reply(), None);
        buffer.feed(b"250 last\r\n");
        assert_eq!(buffer.next_reply().as_deref(), Some("250-first\n250 last"));
    }

    #[test]
    fn test_buffer_burst_is_fifo() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"250 sender ok\r\n250 rcpt ok\r\n\r\n550 no such user\r\n354 go");
        assert_eq!(buffer.next_reply().as_deref(), Some("250 sender ok"));
        assert_eq!(buffer.next_reply().as_deref(), Some("250 rcpt ok"));
        assert_eq!(buffer.next_reply().as_deref(), Some("550 no such user"));
        assert_eq!(buffer.next_reply(), None);
        buffer.feed(b"\r\n");
        assert_eq!(buffer.next_reply().as_deref(), Some("354 go"));
    }

    #[test]
    fn test_buffer_decodes_latin1() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"250 caf\xe9\r\n");
        assert_eq!(buffer.next_reply().as_deref(), Some("250 caf\u{e9}"));
    }

    #[test]
    fn test_buffer_remainder_and_clear() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"250-partial\r\n250-more");
        assert_eq!(buffer.remainder(), "250-partial\n250-more");
        buffer.clear();
        assert_eq!(buffer.remainder(), "");
    }

    #[test]
    fn test_continuation_detection() {
        assert!(is_continuation_line("250-OK"));
        assert!(is_continuation_line("5-x"));
        assert!(!is_continuation_line("250 OK"));
        assert!(!is_continuation_line("-250"));
        assert!(!is_continuation_line("250"));
    }
}
