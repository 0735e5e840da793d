//! Incremental body encoders.
//!
//! Message content can arrive in arbitrary chunks (for example from a file
//! reader). These encoders keep just enough state between chunks to produce
//! output identical to encoding the whole body at once.

use super::{MAX_LINE_LENGTH, TransferEncoding};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Input bytes per Base64 output line (57 bytes encode to 76 characters).
const BASE64_LINE_INPUT: usize = MAX_LINE_LENGTH / 4 * 3;

/// Stateful encoder for one body part.
#[derive(Debug)]
pub enum BodyEncoder {
    /// Base64 wrapped at 76 columns.
    Base64 {
        /// Bytes not yet forming a full output line.
        pending: Vec<u8>,
        /// Whether a line was already written.
        started: bool,
    },
    /// Quoted-Printable with soft breaks at 76 columns.
    QuotedPrintable(QpState),
    /// 7bit/8bit/binary: line endings normalized to CRLF only.
    Plain {
        /// Whether the previous byte was a carriage return.
        last_cr: bool,
    },
}

impl BodyEncoder {
    /// Creates an encoder for the given transfer encoding.
    #[must_use]
    pub const fn new(encoding: TransferEncoding) -> Self {
        match encoding {
            TransferEncoding::Base64 => Self::Base64 {
                pending: Vec::new(),
                started: false,
            },
            TransferEncoding::QuotedPrintable => Self::QuotedPrintable(QpState::new()),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Self::Plain { last_cr: false }
            }
        }
    }

    /// Feeds a chunk of raw content, appending encoded output to `out`.
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        match self {
            Self::Base64 { pending, started } => {
                pending.extend_from_slice(chunk);
                let full = pending.len() / BASE64_LINE_INPUT * BASE64_LINE_INPUT;
                for line in pending[..full].chunks(BASE64_LINE_INPUT) {
                    if *started {
                        out.extend_from_slice(b"\r\n");
                    }
                    out.extend_from_slice(STANDARD.encode(line).as_bytes());
                    *started = true;
                }
                pending.drain(..full);
            }
            Self::QuotedPrintable(state) => {
                out.reserve(chunk.len());
                for &byte in chunk {
                    state.push(byte, out);
                }
            }
            Self::Plain { last_cr } => {
                out.reserve(chunk.len());
                for &byte in chunk {
                    if byte == b'\n' && !*last_cr {
                        out.push(b'\r');
                    }
                    out.push(byte);
                    *last_cr = byte == b'\r';
                }
            }
        }
    }

    /// Flushes any buffered input. The output does not end with a line break
    /// unless the content itself did.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        match self {
            Self::Base64 { pending, started } => {
                if !pending.is_empty() {
                    if *started {
                        out.extend_from_slice(b"\r\n");
                    }
                    out.extend_from_slice(STANDARD.encode(pending.as_slice()).as_bytes());
                    pending.clear();
                    *started = true;
                }
            }
            Self::QuotedPrintable(state) => state.finish(out),
            Self::Plain { .. } => {}
        }
    }
}

/// Quoted-Printable encoder state.
///
/// Only the last content byte and a trailing CR are held back: whether a
/// space must be escaped, and whether the last token may use the full line
/// width, depends on the byte that follows.
#[derive(Debug, Default)]
pub struct QpState {
    held: Option<u8>,
    pending_cr: bool,
    column: usize,
}

impl QpState {
    const fn new() -> Self {
        Self {
            held: None,
            pending_cr: false,
            column: 0,
        }
    }

    fn push(&mut self, byte: u8, out: &mut Vec<u8>) {
        match byte {
            b'\n' => {
                // A CR directly before LF is part of the line break
                self.pending_cr = false;
                if let Some(last) = self.held.take() {
                    self.emit(last, true, out);
                }
                out.extend_from_slice(b"\r\n");
                self.column = 0;
            }
            b'\r' => {
                if self.pending_cr {
                    self.push_content(b'\r', out);
                }
                self.pending_cr = true;
            }
            _ => {
                if self.pending_cr {
                    self.pending_cr = false;
                    self.push_content(b'\r', out);
                }
                self.push_content(byte, out);
            }
        }
    }

    fn push_content(&mut self, byte: u8, out: &mut Vec<u8>) {
        if let Some(previous) = self.held.replace(byte) {
            self.emit(previous, false, out);
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            self.pending_cr = false;
            self.push_content(b'\r', out);
        }
        if let Some(last) = self.held.take() {
            self.emit(last, true, out);
        }
        self.column = 0;
    }

    /// Writes one content byte, inserting a soft break first when the
    /// output line would exceed 76 characters.
    fn emit(&mut self, byte: u8, is_last: bool, out: &mut Vec<u8>) {
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            // Whitespace at the end of a line must be escaped
            b' ' | b'\t' => !is_last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // The last token may use the full width, others leave room for '='
        let limit = if is_last { MAX_LINE_LENGTH } else { MAX_LINE_LENGTH - 1 };
        if self.column + width > limit {
            out.extend_from_slice(b"=\r\n");
            self.column = 0;
        }

        if literal {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("={byte:02X}").as_bytes());
        }
        self.column += width;
    }
}
