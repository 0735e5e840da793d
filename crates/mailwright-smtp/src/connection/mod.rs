//! SMTP connection management.
//!
//! [`Client`] owns one socket and drives the session through the
//! [`Phase`] table, correlating replies through [`PendingReplies`].

mod client;
mod config;
mod data;
mod state;
mod stream;

pub use client::Client;
pub use config::{
    AllRecipientsRejected, Credentials, DEFAULT_PORT, DEFAULT_TLS_PORT, SmtpConfig,
    SmtpConfigBuilder, TlsOptions,
};
pub use data::{DotStuffer, write_message};
pub use state::{Expect, PendingReplies, Phase, Stage};
pub use stream::{SmtpStream, connect_tcp};

use crate::types::{AuthMechanism, Extension, Reply};

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server hostname from the EHLO reply.
    pub hostname: String,
    /// Supported extensions, in advertised order.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Builds capabilities from a successful EHLO reply.
    ///
    /// The first line normally names the server, but it is read as a
    /// capability when it starts with a known keyword. Repeated `AUTH`
    /// lines (such as `AUTH=` next to `AUTH`) are merged.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let mut hostname = "unknown".to_string();
        let mut extensions: Vec<Extension> = Vec::new();
        for (idx, line) in reply.message.iter().enumerate() {
            let extension = Extension::parse(line);
            if idx == 0 && matches!(extension, Extension::Other { .. }) {
                if let Some(name) = line.split_whitespace().next() {
                    hostname = name.to_string();
                }
                continue;
            }
            match extension {
                Extension::Auth(mechanisms) => {
                    if let Some(Extension::Auth(known)) = extensions
                        .iter_mut()
                        .find(|ext| matches!(ext, Extension::Auth(_)))
                    {
                        for mechanism in mechanisms {
                            if !known.contains(&mechanism) {
                                known.push(mechanism);
                            }
                        }
                    } else {
                        extensions.push(Extension::Auth(mechanisms));
                    }
                }
                ext => {
                    if !extensions.contains(&ext) {
                        extensions.push(ext);
                    }
                }
            }
        }

        Self {
            hostname,
            extensions,
        }
    }

    /// Capabilities after a HELO fallback: none.
    #[must_use]
    pub fn from_helo(reply: &Reply) -> Self {
        let hostname = reply
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        Self {
            hostname,
            extensions: Vec::new(),
        }
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if PIPELINING is supported.
    #[must_use]
    pub fn supports_pipelining(&self) -> bool {
        self.supports(&Extension::Pipelining)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Checks if SMTPUTF8 is supported.
    #[must_use]
    pub fn supports_smtputf8(&self) -> bool {
        self.supports(&Extension::SmtpUtf8)
    }

    /// Checks if DSN is supported.
    #[must_use]
    pub fn supports_dsn(&self) -> bool {
        self.supports(&Extension::Dsn)
    }

    /// Checks if SIZE is advertised, with or without a limit.
    #[must_use]
    pub fn supports_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms, in advertised order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::parse_reply;

    #[test]
    fn test_from_ehlo() {
        let reply = parse_reply(
            "250-smtp.example.com greets you\n250-PIPELINING\n250-SIZE 1000\n250-AUTH LOGIN PLAIN\n250-AUTH=LOGIN XOAUTH2\n250-8BITMIME\n250 STARTTLS",
        )
        .unwrap();
        let info = ServerInfo::from_ehlo(&reply);

        assert_eq!(info.hostname, "smtp.example.com");
        assert!(info.supports_pipelining());
        assert!(info.supports_8bitmime());
        assert!(info.supports_starttls());
        assert!(info.supports_size());
        assert!(!info.supports_dsn());
        assert!(!info.supports_smtputf8());
        assert_eq!(info.max_message_size(), Some(1000));
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Login, AuthMechanism::Plain, AuthMechanism::XOAuth2]
        );
    }

    #[test]
    fn test_size_without_limit() {
        let reply = parse_reply("250-mx.example.com\n250 SIZE").unwrap();
        let info = ServerInfo::from_ehlo(&reply);
        assert!(info.supports_size());
        assert_eq!(info.max_message_size(), None);
    }

    #[test]
    fn test_from_helo_has_no_extensions() {
        let reply = parse_reply("250 mx.example.com").unwrap();
        let info = ServerInfo::from_helo(&reply);
        assert_eq!(info.hostname, "mx.example.com");
        assert!(info.extensions.is_empty());
        assert!(info.auth_mechanisms().is_empty());
    }

    #[test]
    fn test_capability_on_first_line() {
        let reply = parse_reply("250-STARTTLS\n250 AUTH PLAIN").unwrap();
        let info = ServerInfo::from_ehlo(&reply);
        assert_eq!(info.hostname, "unknown");
        assert!(info.supports_starttls());
        assert_eq!(info.auth_mechanisms(), vec![AuthMechanism::Plain]);

        let single = ServerInfo::from_ehlo(&parse_reply("250 PIPELINING").unwrap());
        assert!(single.supports_pipelining());

        let greeting = ServerInfo::from_ehlo(&parse_reply("250 mx.example.com").unwrap());
        assert_eq!(greeting.hostname, "mx.example.com");
        assert!(greeting.extensions.is_empty());
    }
}
