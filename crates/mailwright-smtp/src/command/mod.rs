//! Client commands and their wire form.

use std::fmt;

use crate::types::{Address, AuthMechanism, DsnReturn, encode_xtext};

/// Placeholder written to logs instead of credentials.
pub const SECRET_PLACEHOLDER: &str = "/* secret */";

/// A command the client can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELO <name>`
    Helo {
        /// EHLO identity
        hostname: String,
    },
    /// `EHLO <name>`
    Ehlo {
        /// EHLO identity
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism> [initial-response]`
    Auth {
        /// SASL mechanism
        mechanism: AuthMechanism,
        /// Base64 initial response (RFC 4954 SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a `334` challenge.
    AuthResponse(String),
    /// `MAIL FROM:<addr> [params]`
    MailFrom {
        /// Sender; `None` is the null reverse path `<>`
        from: Option<Address>,
        /// `BODY=` value
        body: Option<String>,
        /// `SIZE=` value
        size: Option<usize>,
        /// `SMTPUTF8` keyword
        smtputf8: bool,
        /// `RET=` value
        ret: Option<DsnReturn>,
        /// `ENVID=` value, xtext-encoded on the wire
        envid: Option<String>,
    },
    /// `RCPT TO:<addr> [params]`
    RcptTo {
        /// Recipient
        to: Address,
        /// `NOTIFY=` value
        notify: Option<String>,
        /// `ORCPT=rfc822;` address, xtext-encoded on the wire
        orcpt: Option<String>,
    },
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `NOOP`
    Noop,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Name used as error context (`EHLO`, `AUTH LOGIN`, `MAIL FROM`, ...).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { mechanism, .. } => match mechanism {
                AuthMechanism::Plain => "AUTH PLAIN",
                AuthMechanism::Login => "AUTH LOGIN",
                AuthMechanism::CramMd5 => "AUTH CRAM-MD5",
                AuthMechanism::XOAuth2 => "AUTH XOAUTH2",
            },
            Self::AuthResponse(_) => "AUTH",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// The command line for logs, without CRLF. SASL payloads are replaced
    /// with [`SECRET_PLACEHOLDER`].
    #[must_use]
    pub fn log_line(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {mechanism} {SECRET_PLACEHOLDER}"),
            Self::AuthResponse(_) => SECRET_PLACEHOLDER.to_string(),
            _ => self.to_string(),
        }
    }

    /// The CRLF-terminated wire bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }
}

impl fmt::Display for Command {
    /// Writes the command line without CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo { hostname } => write!(f, "HELO {hostname}"),
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTH {mechanism}")?;
                match initial_response {
                    Some(response) => write!(f, " {response}"),
                    None => Ok(()),
                }
            }
            Self::AuthResponse(response) => f.write_str(response),
            Self::MailFrom {
                from,
                body,
                size,
                smtputf8,
                ret,
                envid,
            } => {
                let path = from.as_ref().map_or("", Address::as_str);
                write!(f, "MAIL FROM:<{path}>")?;
                if let Some(body) = body {
                    write!(f, " BODY={body}")?;
                }
                if *smtputf8 {
                    f.write_str(" SMTPUTF8")?;
                }
                if let Some(size) = size {
                    write!(f, " SIZE={size}")?;
                }
                if let Some(ret) = ret {
                    write!(f, " RET={}", ret.as_str())?;
                }
                if let Some(envid) = envid {
                    write!(f, " ENVID={}", encode_xtext(envid))?;
                }
                Ok(())
            }
            Self::RcptTo { to, notify, orcpt } => {
                write!(f, "RCPT TO:<{to}>")?;
                if let Some(notify) = notify {
                    write!(f, " NOTIFY={notify}")?;
                }
                if let Some(orcpt) = orcpt {
                    write!(f, " ORCPT=rfc822;{}", encode_xtext(orcpt))?;
                }
                Ok(())
            }
            Self::StartTls | Self::Data | Self::Rset | Self::Noop | Self::Quit => {
                f.write_str(self.name())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn address(value: &str) -> Address {
        Address::new(value).unwrap()
    }

    #[test]
    fn test_greetings() {
        let ehlo = Command::Ehlo {
            hostname: "[127.0.0.1]".to_string(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO [127.0.0.1]\r\n");

        let helo = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(helo.to_string(), "HELO client.example.com");
    }

    #[test]
    fn test_bare_verbs() {
        for (cmd, wire) in [
            (Command::StartTls, "STARTTLS\r\n"),
            (Command::Data, "DATA\r\n"),
            (Command::Rset, "RSET\r\n"),
            (Command::Noop, "NOOP\r\n"),
            (Command::Quit, "QUIT\r\n"),
        ] {
            assert_eq!(cmd.serialize(), wire.as_bytes());
        }
    }

    #[test]
    fn test_auth_plain_is_redacted() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert_eq!(cmd.log_line(), "AUTH PLAIN /* secret */");
        assert_eq!(cmd.name(), "AUTH PLAIN");
    }

    #[test]
    fn test_auth_login_continuation_is_redacted() {
        let start = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(start.log_line(), "AUTH LOGIN");

        let step = Command::AuthResponse("dXNlcg==".to_string());
        assert_eq!(step.serialize(), b"dXNlcg==\r\n");
        assert_eq!(step.log_line(), SECRET_PLACEHOLDER);

        assert_eq!(Command::AuthResponse(String::new()).serialize(), b"\r\n");
    }

    #[test]
    fn test_mail_from_paths() {
        let cmd = Command::MailFrom {
            from: Some(address("sender@example.com")),
            body: None,
            size: None,
            smtputf8: false,
            ret: None,
            envid: None,
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
        assert_eq!(cmd.log_line(), "MAIL FROM:<sender@example.com>");

        let null = Command::MailFrom {
            from: None,
            body: None,
            size: None,
            smtputf8: false,
            ret: None,
            envid: None,
        };
        assert_eq!(null.to_string(), "MAIL FROM:<>");
    }

    #[test]
    fn test_mail_from_parameter_order() {
        let cmd = Command::MailFrom {
            from: Some(address("sender@example.com")),
            body: Some("8BITMIME".to_string()),
            size: Some(12345),
            smtputf8: true,
            ret: Some(DsnReturn::Headers),
            envid: Some("id 1".to_string()),
        };
        assert_eq!(
            cmd.to_string(),
            "MAIL FROM:<sender@example.com> BODY=8BITMIME SMTPUTF8 SIZE=12345 RET=HDRS ENVID=id+201"
        );
    }

    #[test]
    fn test_rcpt_to() {
        let plain = Command::RcptTo {
            to: address("recipient@example.com"),
            notify: None,
            orcpt: None,
        };
        assert_eq!(plain.serialize(), b"RCPT TO:<recipient@example.com>\r\n");

        let dsn = Command::RcptTo {
            to: address("recipient@example.com"),
            notify: Some("SUCCESS,FAILURE".to_string()),
            orcpt: Some("a+b@example.com".to_string()),
        };
        assert_eq!(
            dsn.to_string(),
            "RCPT TO:<recipient@example.com> NOTIFY=SUCCESS,FAILURE ORCPT=rfc822;a+2Bb@example.com"
        );
    }
}
