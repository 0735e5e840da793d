//! Connection configuration types.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::CertificateDer;

use crate::resolver::Resolver;
use crate::types::AuthMechanism;

/// Submission port with STARTTLS.
pub const DEFAULT_PORT: u16 = 587;
/// Submission port with implicit TLS.
pub const DEFAULT_TLS_PORT: u16 = 465;

/// Login credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password, for PLAIN or LOGIN.
    Plain {
        /// Username.
        user: String,
        /// Password.
        pass: String,
    },
    /// `OAuth2` bearer token, for `XOAUTH2`.
    OAuth2 {
        /// Username.
        user: String,
        /// Access token.
        access_token: String,
    },
}

impl Credentials {
    /// Creates username/password credentials.
    #[must_use]
    pub fn plain(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self::Plain {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// Creates `OAuth2` credentials.
    #[must_use]
    pub fn oauth2(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::OAuth2 {
            user: user.into(),
            access_token: access_token.into(),
        }
    }

    /// Username.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Plain { user, .. } | Self::OAuth2 { user, .. } => user,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { user, .. } => f
                .debug_struct("Plain")
                .field("user", user)
                .field("pass", &"/* secret */")
                .finish(),
            Self::OAuth2 { user, .. } => f
                .debug_struct("OAuth2")
                .field("user", user)
                .field("access_token", &"/* secret */")
                .finish(),
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// SNI and certificate name; defaults to the configured host.
    pub servername: Option<String>,
    /// Skips certificate verification. Test servers only.
    pub accept_invalid_certs: bool,
    /// Additional trust anchors besides the web PKI roots.
    pub extra_roots: Vec<CertificateDer<'static>>,
}

/// What to do when every recipient is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllRecipientsRejected {
    /// Fail the send with `EENVELOPE`.
    #[default]
    Fail,
    /// Issue DATA anyway and let the server decide.
    SendData,
}

/// SMTP connection configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Use implicit TLS from the first byte.
    pub secure: bool,
    /// Never issue STARTTLS.
    pub ignore_tls: bool,
    /// Fail unless the session ends up encrypted.
    pub require_tls: bool,
    /// Continue in plaintext if STARTTLS is refused.
    pub opportunistic_tls: bool,
    /// EHLO identity; defaults to the local address literal.
    pub name: Option<String>,
    /// Local address to bind the socket to.
    pub local_address: Option<IpAddr>,
    /// Limit for opening the socket (and the implicit TLS handshake).
    pub connection_timeout: Duration,
    /// Limit for the server greeting.
    pub greeting_timeout: Duration,
    /// Limit for every socket read and write.
    pub socket_timeout: Duration,
    /// Credentials used right after the handshake.
    pub auth: Option<Credentials>,
    /// Forces an authentication mechanism.
    pub auth_method: Option<AuthMechanism>,
    /// TLS settings.
    pub tls: TlsOptions,
    /// Policy when every recipient is refused.
    pub all_recipients_rejected: AllRecipientsRejected,
    /// Host name resolver; a fresh [`CachedResolver`](crate::CachedResolver)
    /// is used when unset.
    pub resolver: Option<Arc<dyn Resolver>>,
}

impl SmtpConfig {
    /// Creates a configuration with defaults for the given host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        SmtpConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SmtpConfigBuilder {
        SmtpConfigBuilder::new(host)
    }
}

/// Builder for [`SmtpConfig`].
#[derive(Debug, Clone)]
pub struct SmtpConfigBuilder {
    host: String,
    port: Option<u16>,
    secure: bool,
    ignore_tls: bool,
    require_tls: bool,
    opportunistic_tls: bool,
    name: Option<String>,
    local_address: Option<IpAddr>,
    connection_timeout: Duration,
    greeting_timeout: Duration,
    socket_timeout: Duration,
    auth: Option<Credentials>,
    auth_method: Option<AuthMechanism>,
    tls: TlsOptions,
    all_recipients_rejected: AllRecipientsRejected,
    resolver: Option<Arc<dyn Resolver>>,
}

impl SmtpConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: false,
            ignore_tls: false,
            require_tls: false,
            opportunistic_tls: false,
            name: None,
            local_address: None,
            connection_timeout: Duration::from_secs(2 * 60),
            greeting_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(10 * 60),
            auth: None,
            auth_method: None,
            tls: TlsOptions::default(),
            all_recipients_rejected: AllRecipientsRejected::Fail,
            resolver: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables implicit TLS.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Disables STARTTLS.
    #[must_use]
    pub const fn ignore_tls(mut self, ignore: bool) -> Self {
        self.ignore_tls = ignore;
        self
    }

    /// Requires an encrypted session.
    #[must_use]
    pub const fn require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }

    /// Continues in plaintext when STARTTLS is refused.
    #[must_use]
    pub const fn opportunistic_tls(mut self, opportunistic: bool) -> Self {
        self.opportunistic_tls = opportunistic;
        self
    }

    /// Sets the EHLO identity.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Binds the socket to a local address.
    #[must_use]
    pub const fn local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the greeting timeout.
    #[must_use]
    pub const fn greeting_timeout(mut self, timeout: Duration) -> Self {
        self.greeting_timeout = timeout;
        self
    }

    /// Sets the socket timeout.
    #[must_use]
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Sets credentials used right after the handshake.
    #[must_use]
    pub fn auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    /// Forces an authentication mechanism.
    #[must_use]
    pub const fn auth_method(mut self, mechanism: AuthMechanism) -> Self {
        self.auth_method = Some(mechanism);
        self
    }

    /// Sets the TLS options.
    #[must_use]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the policy for a transaction with no accepted recipient.
    #[must_use]
    pub const fn all_recipients_rejected(mut self, policy: AllRecipientsRejected) -> Self {
        self.all_recipients_rejected = policy;
        self
    }

    /// Sets a shared resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SmtpConfig {
        let default_port = if self.secure {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        };
        SmtpConfig {
            host: self.host,
            port: self.port.unwrap_or(default_port),
            secure: self.secure,
            ignore_tls: self.ignore_tls,
            require_tls: self.require_tls,
            opportunistic_tls: self.opportunistic_tls,
            name: self.name,
            local_address: self.local_address,
            connection_timeout: self.connection_timeout,
            greeting_timeout: self.greeting_timeout,
            socket_timeout: self.socket_timeout,
            auth: self.auth,
            auth_method: self.auth_method,
            tls: self.tls,
            all_recipients_rejected: self.all_recipients_rejected,
            resolver: self.resolver,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = SmtpConfig::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert!(!config.secure);
        assert_eq!(config.connection_timeout, Duration::from_secs(120));
        assert_eq!(config.greeting_timeout, Duration::from_secs(30));
        assert_eq!(config.socket_timeout, Duration::from_secs(600));
        assert_eq!(config.all_recipients_rejected, AllRecipientsRejected::Fail);
        assert!(config.resolver.is_none());
    }

    #[test]
    fn test_secure_default_port() {
        let config = SmtpConfig::builder("smtp.example.com").secure(true).build();
        assert_eq!(config.port, 465);
    }

    #[test]
    fn test_config_builder() {
        let config = SmtpConfig::builder("smtp.example.com")
            .port(2525)
            .require_tls(true)
            .name("client.example.com")
            .socket_timeout(Duration::from_secs(5))
            .auth(Credentials::plain("user", "pass"))
            .auth_method(AuthMechanism::Login)
            .all_recipients_rejected(AllRecipientsRejected::SendData)
            .build();

        assert_eq!(config.port, 2525);
        assert!(config.require_tls);
        assert_eq!(config.name.as_deref(), Some("client.example.com"));
        assert_eq!(config.socket_timeout, Duration::from_secs(5));
        assert_eq!(config.auth_method, Some(AuthMechanism::Login));
        assert_eq!(
            config.all_recipients_rejected,
            AllRecipientsRejected::SendData
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let plain = format!("{:?}", Credentials::plain("jane", "hunter2"));
        assert!(plain.contains("jane"));
        assert!(!plain.contains("hunter2"));

        let oauth = format!("{:?}", Credentials::oauth2("jane", "ya29.token"));
        assert!(!oauth.contains("ya29"));
        assert_eq!(Credentials::oauth2("jane", "t").user(), "jane");
    }
}
