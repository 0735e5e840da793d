//! Session stages, protocol phases and the pending-reply queue.

use std::collections::VecDeque;

use crate::error::{Error, ErrorKind, Result};

/// Lifecycle of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Socket being opened; no bytes exchanged yet.
    Init,
    /// Socket open, greeting received or pending.
    Connected,
    /// `close()` in progress.
    Closing,
    /// Socket released; every operation fails with `ECONNECTION`.
    Closed,
}

/// Position in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the server greeting.
    Greeting,
    /// EHLO or HELO in flight.
    Hello,
    /// STARTTLS in flight.
    StartTls,
    /// Idle between transactions.
    Ready,
    /// SASL exchange in progress.
    Auth,
    /// MAIL FROM in flight.
    Mail,
    /// RCPT TO commands in flight.
    Recipients,
    /// DATA in flight.
    Data,
    /// Message body written, waiting for the final reply.
    Message,
    /// QUIT in flight.
    Quit,
}

/// What a queued reply answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Server greeting.
    Greeting,
    /// Reply to EHLO.
    Ehlo,
    /// Reply to HELO.
    Helo,
    /// Reply to STARTTLS.
    StartTls,
    /// Reply to an AUTH command or a SASL continuation.
    Auth,
    /// Reply to MAIL FROM.
    MailFrom,
    /// Reply to the RCPT TO of the recipient at this index.
    RcptTo(usize),
    /// Reply to DATA.
    Data,
    /// Reply to the terminated message body.
    Message,
    /// Reply to RSET.
    Rset,
    /// Reply to NOOP.
    Noop,
    /// Reply to QUIT.
    Quit,
}

impl Phase {
    /// Returns true if a reply of this kind is legal in this phase.
    #[must_use]
    pub const fn allows(self, expect: Expect) -> bool {
        matches!(
            (self, expect),
            (Self::Greeting, Expect::Greeting)
                | (Self::Hello, Expect::Ehlo | Expect::Helo)
                | (Self::StartTls, Expect::StartTls)
                | (Self::Ready, Expect::Rset | Expect::Noop)
                | (Self::Auth, Expect::Auth)
                | (Self::Mail, Expect::MailFrom)
                | (Self::Recipients, Expect::RcptTo(_))
                | (Self::Data, Expect::Data)
                | (Self::Message, Expect::Message)
                | (Self::Quit, Expect::Quit)
        )
    }
}

/// FIFO of expectations, one per command written.
#[derive(Debug, Default)]
pub struct PendingReplies {
    queue: VecDeque<Expect>,
}

impl PendingReplies {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an expectation for a command just written.
    pub fn push(&mut self, expect: Expect) {
        self.queue.push_back(expect);
    }

    /// Takes the expectation answered by the next reply.
    ///
    /// # Errors
    ///
    /// Returns an `EPROTOCOL` error if nothing is pending or the head of the
    /// queue is not legal in `phase`.
    pub fn pop(&mut self, phase: Phase, reply: &str) -> Result<Expect> {
        let Some(expect) = self.queue.front().copied() else {
            return Err(Error::new(ErrorKind::Protocol, "Unexpected server reply")
                .with_response(reply.to_string()));
        };
        if !phase.allows(expect) {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("Reply for {expect:?} received during {phase:?}"),
            )
            .with_response(reply.to_string()));
        }
        self.queue.pop_front();
        Ok(expect)
    }

    /// Number of replies still expected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no reply is expected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every pending expectation.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    const PHASES: [Phase; 10] = [
        Phase::Greeting,
        Phase::Hello,
        Phase::StartTls,
        Phase::Ready,
        Phase::Auth,
        Phase::Mail,
        Phase::Recipients,
        Phase::Data,
        Phase::Message,
        Phase::Quit,
    ];

    const EXPECTS: [Expect; 12] = [
        Expect::Greeting,
        Expect::Ehlo,
        Expect::Helo,
        Expect::StartTls,
        Expect::Auth,
        Expect::MailFrom,
        Expect::RcptTo(0),
        Expect::Data,
        Expect::Message,
        Expect::Rset,
        Expect::Noop,
        Expect::Quit,
    ];

    #[test]
    fn transition_table() {
        let allowed = [
            (Phase::Greeting, Expect::Greeting),
            (Phase::Hello, Expect::Ehlo),
            (Phase::Hello, Expect::Helo),
            (Phase::StartTls, Expect::StartTls),
            (Phase::Ready, Expect::Rset),
            (Phase::Ready, Expect::Noop),
            (Phase::Auth, Expect::Auth),
            (Phase::Mail, Expect::MailFrom),
            (Phase::Recipients, Expect::RcptTo(0)),
            (Phase::Data, Expect::Data),
            (Phase::Message, Expect::Message),
            (Phase::Quit, Expect::Quit),
        ];
        for phase in PHASES {
            for expect in EXPECTS {
                assert_eq!(
                    phase.allows(expect),
                    allowed.contains(&(phase, expect)),
                    "{phase:?} / {expect:?}"
                );
            }
        }
    }

    #[test]
    fn recipients_accept_any_index() {
        assert!(Phase::Recipients.allows(Expect::RcptTo(41)));
    }

    #[test]
    fn pop_is_fifo() {
        let mut pending = PendingReplies::new();
        pending.push(Expect::RcptTo(0));
        pending.push(Expect::RcptTo(1));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.pop(Phase::Recipients, "250 ok").unwrap(), Expect::RcptTo(0));
        assert_eq!(pending.pop(Phase::Recipients, "550 no").unwrap(), Expect::RcptTo(1));
        assert!(pending.is_empty());
    }

    #[test]
    fn pop_without_expectation_is_protocol_error() {
        let mut pending = PendingReplies::new();
        let err = pending.pop(Phase::Ready, "250 surprise").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.response_code(), Some(250));
    }

    #[test]
    fn pop_out_of_phase_keeps_queue() {
        let mut pending = PendingReplies::new();
        pending.push(Expect::Data);
        let err = pending.pop(Phase::Mail, "354 go ahead").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(pending.len(), 1);
        pending.clear();
        assert!(pending.is_empty());
    }
}
