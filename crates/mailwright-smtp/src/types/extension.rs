//! EHLO capabilities.

use std::fmt;

/// One capability line of an EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS (RFC 3207)
    StartTls,
    /// AUTH with the advertised mechanisms, in order (RFC 4954)
    Auth(Vec<AuthMechanism>),
    /// SIZE with an optional limit in bytes (RFC 1870)
    Size(Option<usize>),
    /// 8BITMIME (RFC 6152)
    EightBitMime,
    /// PIPELINING (RFC 2920)
    Pipelining,
    /// SMTPUTF8 (RFC 6531)
    SmtpUtf8,
    /// DSN (RFC 3461)
    Dsn,
    /// Any capability the client does not act on.
    Other {
        /// Upper-cased keyword.
        keyword: String,
        /// Remaining tokens.
        params: Vec<String>,
    },
}

impl Extension {
    /// Parses one EHLO capability line.
    ///
    /// The keyword is matched as a whole word, case-insensitive. Unknown
    /// AUTH mechanisms are skipped.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Self::Other {
                keyword: String::new(),
                params: Vec::new(),
            };
        };

        // Legacy servers advertise `AUTH=LOGIN PLAIN`.
        let (keyword, inline) = first
            .split_once('=')
            .map_or((first, None), |(keyword, rest)| (keyword, Some(rest)));
        let keyword = keyword.to_ascii_uppercase();
        let params = inline
            .filter(|rest| !rest.is_empty())
            .into_iter()
            .chain(tokens);

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(params.filter_map(|name| name.parse().ok()).collect()),
            "SIZE" => Self::Size(params.take(1).find_map(|limit| limit.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            _ => Self::Other {
                params: params.map(str::to_string).collect(),
                keyword,
            },
        }
    }
}

/// SASL mechanism names seen in `AUTH` capabilities.
///
/// Only PLAIN, LOGIN and XOAUTH2 can be used for login; CRAM-MD5 is
/// recognized so it can be reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616)
    Plain,
    /// LOGIN
    Login,
    /// CRAM-MD5
    CramMd5,
    /// `XOAUTH2` bearer token
    XOAuth2,
}

impl AuthMechanism {
    /// Returns the mechanism name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::str::FromStr for AuthMechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            "CRAM-MD5" => Ok(Self::CramMd5),
            "XOAUTH2" => Ok(Self::XOAuth2),
            _ => Err(format!("unknown SASL mechanism: {s}")),
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
