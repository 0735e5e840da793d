//! DATA phase writer: CRLF normalization, dot stuffing and termination.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, ErrorKind, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental dot-stuffing transform.
///
/// Bare LF becomes CRLF, a lone CR is passed through, and a line starting
/// with `.` gets a second `.`.
#[derive(Debug)]
pub struct DotStuffer {
    line_start: bool,
    pending_cr: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DotStuffer {
    /// Creates a transform positioned at the start of a line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            line_start: true,
            pending_cr: false,
        }
    }

    /// Transforms a chunk, appending the result to `out`.
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len() + chunk.len() / 32 + 2);
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    out.extend_from_slice(b"\r\n");
                    self.line_start = true;
                    continue;
                }
                out.push(b'\r');
                self.line_start = false;
            }
            match byte {
                b'\r' => self.pending_cr = true,
                b'\n' => {
                    out.extend_from_slice(b"\r\n");
                    self.line_start = true;
                }
                _ => {
                    if self.line_start && byte == b'.' {
                        out.push(b'.');
                    }
                    out.push(byte);
                    self.line_start = false;
                }
            }
        }
    }

    /// Terminates the last line if needed and appends `.\r\n`.
    pub fn finish(self, out: &mut Vec<u8>) {
        if self.pending_cr || !self.line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
    }
}

/// Copies `source` into `sink` as an SMTP DATA payload.
///
/// Returns the number of bytes written. Every write is bounded by
/// `write_timeout`.
///
/// # Errors
///
/// `ESTREAM` if the source fails, `ETIMEDOUT` if a write stalls and
/// `ECONNECTION` if the socket fails.
pub async fn write_message<R, W>(source: &mut R, sink: &mut W, write_timeout: Duration) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stuffer = DotStuffer::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut out = Vec::with_capacity(CHUNK_SIZE + 256);
    let mut written = 0u64;

    loop {
        let n = source
            .read(&mut chunk)
            .await
            .map_err(|err| Error::io(ErrorKind::Stream, "Message source failed", err))?;
        if n == 0 {
            break;
        }
        out.clear();
        stuffer.update(&chunk[..n], &mut out);
        write_chunk(sink, &out, write_timeout).await?;
        written += out.len() as u64;
    }

    out.clear();
    stuffer.finish(&mut out);
    write_chunk(sink, &out, write_timeout).await?;
    written += out.len() as u64;

    match timeout(write_timeout, sink.flush()).await {
        Ok(Ok(())) => Ok(written),
        Ok(Err(err)) => Err(Error::io(ErrorKind::Connection, "Write failed", err)),
        Err(_) => Err(Error::new(ErrorKind::Timeout, "Timeout while writing message")),
    }
}

async fn write_chunk<W>(sink: &mut W, data: &[u8], write_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match timeout(write_timeout, sink.write_all(data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Error::io(ErrorKind::Connection, "Write failed", err)),
        Err(_) => Err(Error::new(ErrorKind::Timeout, "Timeout while writing message")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use std::io;

    fn stuff(chunks: &[&[u8]]) -> Vec<u8> {
        let mut stuffer = DotStuffer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            stuffer.update(chunk, &mut out);
        }
        stuffer.finish(&mut out);
        out
    }

    #[test]
    fn leading_dots_are_doubled() {
        assert_eq!(stuff(&[b".hidden\r\nok\r\n..two\r\n"]), b"..hidden\r\nok\r\n...two\r\n.\r\n");
    }

    #[test]
    fn bare_lf_becomes_crlf() {
        assert_eq!(stuff(&[b"a\nb\n"]), b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn missing_final_newline_is_added() {
        assert_eq!(stuff(&[b"no newline"]), b"no newline\r\n.\r\n");
    }

    #[test]
    fn empty_message() {
        assert_eq!(stuff(&[]), b".\r\n");
    }

    #[test]
    fn crlf_split_across_chunks() {
        assert_eq!(stuff(&[b"line\r", b"\n.dot\r", b"\n"]), b"line\r\n..dot\r\n.\r\n");
    }

    #[test]
    fn lone_cr_is_not_a_line_break() {
        assert_eq!(stuff(&[b"a\r.b\n"]), b"a\r.b\r\n.\r\n");
    }

    #[test]
    fn dot_mid_line_is_untouched() {
        assert_eq!(stuff(&[b"a.b\r\n"]), b"a.b\r\n.\r\n");
    }

    #[tokio::test]
    async fn write_message_streams_to_sink() {
        let mut source: &[u8] = b"Subject: hi\n\n.\nbye";
        let mut sink = tokio_test::io::Builder::new()
            .write(b"Subject: hi\r\n\r\n..\r\nbye")
            .write(b"\r\n.\r\n")
            .build();

        let written = write_message(&mut source, &mut sink, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(written, 27);
    }

    #[tokio::test]
    async fn failing_source_is_stream_error() {
        let mut source = tokio_test::io::Builder::new()
            .read(b"partial\n")
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut sink = tokio_test::io::Builder::new().write(b"partial\r\n").build();

        let err = write_message(&mut source, &mut sink, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stream);
    }

    #[tokio::test]
    async fn failing_sink_is_connection_error() {
        let mut source: &[u8] = b"hello\r\n";
        let mut sink = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = write_message(&mut source, &mut sink, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
