//! SMTP session client.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::ServerInfo;
use super::config::{AllRecipientsRejected, Credentials, SmtpConfig};
use super::data::write_message;
use super::state::{Expect, PendingReplies, Phase, Stage};
use super::stream::{SmtpStream, connect_tcp};
use crate::auth;
use crate::command::Command;
use crate::error::{Error, ErrorKind, Result};
use crate::parser::{ReplyBuffer, parse_reply};
use crate::resolver::{CachedResolver, Resolver};
use crate::types::{Address, AuthMechanism, Dsn, Envelope, Reply, ReplyCode, SendInfo};

const READ_CHUNK: usize = 8 * 1024;

/// SMTP client owning one connection.
///
/// Every method takes `&mut self`, so one command sequence runs at a time.
/// Fatal errors (`ETIMEDOUT`, `EDNS`, `ECONNECTION`, `ETLS`, `ESTREAM`,
/// `EPROTOCOL`) close the connection; server refusals (`EAUTH`,
/// `EENVELOPE`, `EMESSAGE`) leave it usable.
#[derive(Debug)]
pub struct Client {
    config: SmtpConfig,
    stream: Option<SmtpStream>,
    stage: Stage,
    phase: Phase,
    pending: PendingReplies,
    buffer: ReplyBuffer,
    server_info: ServerInfo,
    servername: String,
    name: String,
    secure: bool,
    authenticated: bool,
}

impl Client {
    /// Connects, reads the greeting and completes EHLO (and STARTTLS when
    /// available). Logs in as well when `config.auth` is set.
    ///
    /// # Errors
    ///
    /// `EDNS` if the host cannot be resolved, `ETIMEDOUT` if the socket or
    /// greeting times out, `ECONNECTION` if the socket fails or the greeting
    /// is not `2xx`, `ETLS` if the TLS handshake fails, `EAUTH` if the
    /// configured credentials are refused.
    pub async fn connect(config: SmtpConfig) -> Result<Self> {
        let resolver: Arc<dyn Resolver> = config
            .resolver
            .clone()
            .unwrap_or_else(|| Arc::new(CachedResolver::default()));
        let resolved = resolver.resolve(&config.host).await?;
        let servername = config
            .tls
            .servername
            .clone()
            .or_else(|| resolved.servername.clone())
            .unwrap_or_else(|| config.host.clone());

        info!(
            host = %config.host,
            address = %resolved.host,
            port = config.port,
            secure = config.secure,
            "Connecting"
        );

        let mut client = Self::unopened(config, servername);
        let stream = client.open(&resolved.host).await?;
        client.attach(stream);

        match client.establish().await {
            Ok(()) => Ok(client),
            Err(err) => {
                warn!(code = err.code(), error = %err, "Connection setup failed");
                client.abort();
                Err(err)
            }
        }
    }

    fn unopened(config: SmtpConfig, servername: String) -> Self {
        Self {
            secure: false,
            config,
            stream: None,
            stage: Stage::Init,
            phase: Phase::Greeting,
            pending: PendingReplies::new(),
            buffer: ReplyBuffer::new(),
            server_info: ServerInfo::default(),
            servername,
            name: String::new(),
            authenticated: false,
        }
    }

    /// Opens the socket, plus the TLS layer for implicit TLS. Runs while the
    /// client is still in [`Stage::Init`].
    async fn open(&mut self, address: &str) -> Result<SmtpStream> {
        let tcp = match timeout(
            self.config.connection_timeout,
            connect_tcp(address, self.config.port, self.config.local_address),
        )
        .await
        {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(err)) => {
                return Err(Error::io(ErrorKind::Connection, "Connection failed", err)
                    .with_command("CONN"));
            }
            Err(_) => {
                return Err(Error::new(ErrorKind::Timeout, "Connection timeout").with_command("CONN"));
            }
        };

        self.name = match &self.config.name {
            Some(name) => name.clone(),
            None => tcp
                .local_addr()
                .map_or_else(|_| "[127.0.0.1]".to_string(), |addr| address_literal(addr.ip())),
        };

        if !self.config.secure {
            return Ok(SmtpStream::Tcp(tcp));
        }
        match timeout(
            self.config.connection_timeout,
            SmtpStream::connect_tls(tcp, &self.servername, &self.config.tls),
        )
        .await
        {
            Ok(result) => result.map_err(|err| err.with_command("CONN")),
            Err(_) => Err(Error::new(ErrorKind::Timeout, "TLS handshake timeout").with_command("CONN")),
        }
    }

    /// Moves from [`Stage::Init`] to [`Stage::Connected`].
    fn attach(&mut self, stream: SmtpStream) {
        self.secure = stream.is_tls();
        self.stream = Some(stream);
        self.stage = Stage::Connected;
        debug!(secure = self.secure, "Socket open");
    }

    /// Negotiated server capabilities.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the session is encrypted.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns true after a successful login.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Socket lifecycle stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Current protocol phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// EHLO identity in use.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authenticates with the given credentials.
    ///
    /// The mechanism is `auth_method` when configured, `XOAUTH2` for
    /// `OAuth2` credentials, else the first of PLAIN/LOGIN the server
    /// advertises, else PLAIN.
    ///
    /// # Errors
    ///
    /// `EAUTH` if the server refuses the credentials or the mechanism is
    /// unsupported, `ECONNECTION` if the client is closed.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        self.ensure_open("AUTH")?;
        let result = self.authenticate(credentials).await;
        self.settle(result)
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// `EMESSAGE` if the declared size exceeds the server limit or the
    /// message is refused, `EENVELOPE` if there are no recipients, the
    /// sender is refused, every recipient is refused (with the `Fail`
    /// policy) or an internationalized address needs a missing `SMTPUTF8`,
    /// `ESTREAM` if `message` fails while being read.
    pub async fn send<R>(&mut self, envelope: &Envelope, message: &mut R) -> Result<SendInfo>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.ensure_open("MAIL FROM")?;
        let result = self.transaction(envelope, message).await;
        self.settle(result)
    }

    /// Resets the current transaction with `RSET`.
    ///
    /// # Errors
    ///
    /// `EPROTOCOL` if the server refuses, `ECONNECTION` if closed.
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_open("RSET")?;
        self.phase = Phase::Ready;
        let result = match self.command(Command::Rset, Expect::Rset).await {
            Ok(text) if text.starts_with('2') => Ok(()),
            Ok(text) => Err(Error::new(ErrorKind::Protocol, "RSET failed")
                .with_command("RSET")
                .with_response(text)),
            Err(err) => Err(err),
        };
        self.settle(result)
    }

    /// Sends `NOOP` and returns the reply.
    ///
    /// # Errors
    ///
    /// `ECONNECTION` if closed, `ETIMEDOUT` if the server does not answer.
    pub async fn noop(&mut self) -> Result<Reply> {
        self.ensure_open("NOOP")?;
        self.phase = Phase::Ready;
        let result = match self.command(Command::Noop, Expect::Noop).await {
            Ok(text) => parse_reply(&text),
            Err(err) => Err(err),
        };
        self.settle(result)
    }

    /// Sends `QUIT` and closes the connection.
    ///
    /// A server that closes the socket instead of answering is not an error.
    ///
    /// # Errors
    ///
    /// `ETIMEDOUT` if the server neither answers nor closes in time.
    pub async fn quit(&mut self) -> Result<()> {
        if self.stage != Stage::Connected || self.stream.is_none() {
            self.close().await;
            return Ok(());
        }
        self.phase = Phase::Quit;
        match self.command(Command::Quit, Expect::Quit).await {
            Ok(text) => debug!(response = %text, "QUIT answered"),
            Err(err) if err.kind() == ErrorKind::Connection => {
                debug!("Server closed the connection before answering QUIT");
            }
            Err(err) => {
                self.abort();
                return Err(err);
            }
        }
        self.close().await;
        Ok(())
    }

    /// Closes the connection. Idempotent.
    ///
    /// Pending replies are dropped; an established session is shut down
    /// (TLS close-notify or TCP FIN), anything else is just released.
    pub async fn close(&mut self) {
        if self.stage == Stage::Closed {
            return;
        }
        let established = self.stage == Stage::Connected;
        self.stage = Stage::Closing;
        self.pending.clear();
        self.buffer.clear();
        if let Some(mut stream) = self.stream.take()
            && established
        {
            match timeout(self.config.socket_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "Shutdown failed"),
                Err(_) => debug!("Shutdown timed out"),
            }
        }
        self.stage = Stage::Closed;
        info!(host = %self.config.host, "Connection closed");
    }

    /// Greeting, EHLO/STARTTLS and the optional configured login.
    async fn establish(&mut self) -> Result<()> {
        self.pending.push(Expect::Greeting);
        let greeting = match timeout(self.config.greeting_timeout, self.read_reply()).await {
            Ok(result) => result.map_err(|err| err.with_command("CONN"))?.1,
            Err(_) => {
                return Err(Error::new(ErrorKind::Timeout, "Greeting never received")
                    .with_command("CONN"));
            }
        };
        if !greeting.starts_with('2') {
            return Err(Error::new(ErrorKind::Connection, "Invalid greeting")
                .with_command("CONN")
                .with_response(greeting));
        }

        self.handshake().await?;
        info!(
            host = %self.config.host,
            server = %self.server_info.hostname,
            secure = self.secure,
            "Connection established"
        );

        if let Some(credentials) = self.config.auth.clone() {
            self.authenticate(&credentials).await?;
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        self.hello().await?;
        if !self.secure && !self.config.ignore_tls && self.server_info.supports_starttls() {
            self.starttls().await?;
        }
        if self.config.require_tls && !self.secure {
            return Err(Error::new(
                ErrorKind::Connection,
                "TLS is required but STARTTLS is not available",
            )
            .with_command("STARTTLS"));
        }
        Ok(())
    }

    async fn hello(&mut self) -> Result<()> {
        self.phase = Phase::Hello;
        let ehlo = Command::Ehlo {
            hostname: self.name.clone(),
        };
        let text = self.command(ehlo, Expect::Ehlo).await?;
        if text.starts_with('2') {
            let reply = parse_reply(&text)?;
            self.server_info = ServerInfo::from_ehlo(&reply);
            debug!(extensions = ?self.server_info.extensions, "EHLO accepted");
            self.phase = Phase::Ready;
            return Ok(());
        }

        warn!(response = %text, "EHLO rejected, falling back to HELO");
        let helo = Command::Helo {
            hostname: self.name.clone(),
        };
        let text = self.command(helo, Expect::Helo).await?;
        if !text.starts_with('2') {
            return Err(Error::new(ErrorKind::Protocol, "HELO rejected")
                .with_command("HELO")
                .with_response(text));
        }
        let reply = parse_reply(&text)?;
        self.server_info = ServerInfo::from_helo(&reply);
        self.phase = Phase::Ready;
        Ok(())
    }

    async fn starttls(&mut self) -> Result<()> {
        self.phase = Phase::StartTls;
        let text = self.command(Command::StartTls, Expect::StartTls).await?;
        if !text.starts_with('2') {
            if self.config.opportunistic_tls && !self.config.require_tls {
                warn!(response = %text, "STARTTLS refused, continuing without TLS");
                self.phase = Phase::Ready;
                return Ok(());
            }
            return Err(
                Error::new(ErrorKind::Tls, "Error upgrading connection with STARTTLS")
                    .with_command("STARTTLS")
                    .with_response(text),
            );
        }

        let stream = self.stream.take().ok_or_else(|| closed_error("STARTTLS"))?;
        self.buffer.clear();
        let upgraded = match timeout(
            self.config.connection_timeout,
            stream.upgrade_to_tls(&self.servername, &self.config.tls),
        )
        .await
        {
            Ok(result) => result.map_err(|err| err.with_command("STARTTLS"))?,
            Err(_) => {
                return Err(Error::new(ErrorKind::Timeout, "TLS handshake timeout")
                    .with_command("STARTTLS"));
            }
        };
        self.stream = Some(upgraded);
        self.secure = true;
        self.server_info = ServerInfo::default();
        info!(servername = %self.servername, "Connection upgraded with STARTTLS");
        self.hello().await
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let mechanism = match (self.config.auth_method, credentials) {
            (Some(mechanism), _) => mechanism,
            (None, Credentials::OAuth2 { .. }) => AuthMechanism::XOAuth2,
            (None, Credentials::Plain { .. }) => {
                auth::select_password_mechanism(&self.server_info.auth_mechanisms())
            }
        };

        info!(
            user = credentials.user(),
            mechanism = mechanism.as_str(),
            "Authenticating"
        );
        self.phase = Phase::Auth;
        let result = match (mechanism, credentials) {
            (AuthMechanism::Plain, Credentials::Plain { user, pass }) => {
                self.auth_plain(user, pass).await
            }
            (AuthMechanism::Login, Credentials::Plain { user, pass }) => {
                self.auth_login(user, pass).await
            }
            (AuthMechanism::XOAuth2, Credentials::OAuth2 { user, access_token }) => {
                self.auth_xoauth2(user, access_token).await
            }
            (mechanism, _) => Err(Error::new(
                ErrorKind::Auth,
                format!(
                    "Unsupported authentication mechanism {} for these credentials",
                    mechanism.as_str()
                ),
            )
            .with_command(format!("AUTH {}", mechanism.as_str()))),
        };
        self.phase = Phase::Ready;
        result?;

        self.authenticated = true;
        info!(user = credentials.user(), "Authenticated");
        Ok(())
    }

    async fn auth_plain(&mut self, user: &str, pass: &str) -> Result<()> {
        let command = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(auth::plain_response(user, pass)),
        };
        let text = self.command(command, Expect::Auth).await?;
        auth_outcome(text, "AUTH PLAIN")
    }

    async fn auth_login(&mut self, user: &str, pass: &str) -> Result<()> {
        let command = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        let text = self.command(command, Expect::Auth).await?;
        if !is_code(&text, ReplyCode::AUTH_CONTINUE) {
            return auth_outcome(text, "AUTH LOGIN");
        }

        let text = self
            .command(Command::AuthResponse(auth::login_response(user)), Expect::Auth)
            .await?;
        if !is_code(&text, ReplyCode::AUTH_CONTINUE) {
            return auth_outcome(text, "AUTH LOGIN");
        }

        let text = self
            .command(Command::AuthResponse(auth::login_response(pass)), Expect::Auth)
            .await?;
        auth_outcome(text, "AUTH LOGIN")
    }

    async fn auth_xoauth2(&mut self, user: &str, token: &str) -> Result<()> {
        let command = Command::Auth {
            mechanism: AuthMechanism::XOAuth2,
            initial_response: Some(auth::xoauth2_response(user, token)),
        };
        let text = self.command(command, Expect::Auth).await?;
        if !is_code(&text, ReplyCode::AUTH_CONTINUE) {
            return auth_outcome(text, "AUTH XOAUTH2");
        }

        // The 334 carries an error report; an empty line ends the exchange.
        debug!(challenge = %text, "XOAUTH2 challenge");
        let text = self
            .command(Command::AuthResponse(String::new()), Expect::Auth)
            .await?;
        auth_outcome(text, "AUTH XOAUTH2")
    }

    async fn transaction<R>(&mut self, envelope: &Envelope, message: &mut R) -> Result<SendInfo>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if envelope.to.is_empty() {
            return Err(Error::new(ErrorKind::Envelope, "No recipients defined").with_command("API"));
        }
        if let (Some(size), Some(max)) = (envelope.size, self.server_info.max_message_size())
            && size > max
        {
            return Err(Error::new(
                ErrorKind::Message,
                format!("Message size {size} exceeds server limit {max}"),
            )
            .with_command("MAIL FROM"));
        }

        let international = envelope
            .from
            .iter()
            .chain(envelope.to.iter())
            .any(Address::is_international);
        if international && !self.server_info.supports_smtputf8() {
            return Err(Error::new(
                ErrorKind::Envelope,
                "Internationalized mailbox name not allowed",
            )
            .with_command("MAIL FROM"));
        }

        let started = Instant::now();
        let dsn = envelope
            .dsn
            .as_ref()
            .filter(|_| self.server_info.supports_dsn());
        let mail = Command::MailFrom {
            from: envelope.from.clone(),
            body: self
                .server_info
                .supports_8bitmime()
                .then(|| "8BITMIME".to_string()),
            size: envelope.size.filter(|_| self.server_info.supports_size()),
            smtputf8: envelope.needs_smtputf8() && self.server_info.supports_smtputf8(),
            ret: dsn.and_then(|dsn| dsn.ret),
            envid: dsn.and_then(|dsn| dsn.envid.clone()),
        };

        self.phase = Phase::Mail;
        let text = self.command(mail, Expect::MailFrom).await?;
        if !text.starts_with('2') {
            return Err(Error::new(ErrorKind::Envelope, "Mail command failed")
                .with_command("MAIL FROM")
                .with_response(text));
        }

        self.phase = Phase::Recipients;
        let notify = dsn.and_then(Dsn::notify_value);
        let orcpt = dsn.and_then(|dsn| dsn.orcpt.clone());
        let rcpt = |to: &Address| Command::RcptTo {
            to: to.clone(),
            notify: notify.clone(),
            orcpt: orcpt.clone(),
        };

        // One RCPT at a time, each reply read before the next command
        let mut replies = Vec::with_capacity(envelope.to.len());
        for (index, to) in envelope.to.iter().enumerate() {
            self.write_command(&rcpt(to), Expect::RcptTo(index)).await?;
            let reply = self
                .read_reply()
                .await
                .map_err(|err| err.with_command("RCPT TO"))?;
            replies.push(reply);
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut rejected_errors = Vec::new();
        for (expect, text) in replies {
            let Expect::RcptTo(index) = expect else {
                continue;
            };
            let Some(to) = envelope.to.get(index).cloned() else {
                continue;
            };
            if text.starts_with('2') {
                accepted.push(to);
            } else {
                let status = parse_reply(&text)
                    .ok()
                    .and_then(|reply| reply.enhanced_status())
                    .map(|status| status.to_string());
                warn!(recipient = %to, status = ?status, response = %text, "Recipient rejected");
                rejected_errors.push(
                    Error::new(
                        ErrorKind::Envelope,
                        format!("Recipient command failed: {text}"),
                    )
                    .with_command("RCPT TO")
                    .with_response(text),
                );
                rejected.push(to);
            }
        }

        if accepted.is_empty() {
            match self.config.all_recipients_rejected {
                AllRecipientsRejected::Fail => {
                    let mut err = Error::new(
                        ErrorKind::Envelope,
                        "Can't send mail - all recipients were rejected",
                    )
                    .with_command("RCPT TO");
                    if let Some(response) = rejected_errors.last().and_then(Error::response) {
                        err = err.with_response(response.to_string());
                    }
                    return Err(err);
                }
                AllRecipientsRejected::SendData => {
                    warn!("All recipients rejected, issuing DATA anyway");
                }
            }
        }
        let envelope_time = started.elapsed();

        self.phase = Phase::Data;
        let text = self.command(Command::Data, Expect::Data).await?;
        if !is_code(&text, ReplyCode::START_DATA) {
            return Err(Error::new(ErrorKind::Message, "Data command failed")
                .with_command("DATA")
                .with_response(text));
        }

        let data_started = Instant::now();
        self.phase = Phase::Message;
        let socket_timeout = self.config.socket_timeout;
        let stream = self.stream.as_mut().ok_or_else(|| closed_error("DATA"))?;
        let message_size = write_message(message, stream, socket_timeout)
            .await
            .map_err(|err| err.with_command("DATA"))?;
        self.pending.push(Expect::Message);
        let (_, text) = self
            .read_reply()
            .await
            .map_err(|err| err.with_command("DATA"))?;
        self.phase = Phase::Ready;
        if !text.starts_with('2') {
            return Err(Error::new(ErrorKind::Message, "Message failed")
                .with_command("DATA")
                .with_response(text));
        }

        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            size = message_size,
            "Message accepted"
        );
        Ok(SendInfo {
            accepted,
            rejected,
            rejected_errors,
            response: text,
            envelope_time,
            message_time: data_started.elapsed(),
            message_size,
        })
    }

    /// Writes a command and waits for its reply.
    async fn command(&mut self, command: Command, expect: Expect) -> Result<String> {
        self.write_command(&command, expect).await?;
        self.read_reply()
            .await
            .map(|(_, text)| text)
            .map_err(|err| err.with_command(command.name()))
    }

    async fn write_command(&mut self, command: &Command, expect: Expect) -> Result<()> {
        debug!(command = %command.log_line(), "C:");
        let socket_timeout = self.config.socket_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| closed_error(command.name()))?;
        let bytes = command.serialize();
        let write = async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        };
        match timeout(socket_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(Error::io(ErrorKind::Connection, "Write failed", err)
                    .with_command(command.name()));
            }
            Err(_) => {
                return Err(Error::new(ErrorKind::Timeout, "Timeout while writing command")
                    .with_command(command.name()));
            }
        }
        self.pending.push(expect);
        Ok(())
    }

    /// Returns the next complete reply and the expectation it answers.
    async fn read_reply(&mut self) -> Result<(Expect, String)> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(text) = self.buffer.next_reply() {
                debug!(reply = %text, "S:");
                let expect = self.pending.pop(self.phase, &text)?;
                return Ok((expect, text));
            }

            let socket_timeout = self.config.socket_timeout;
            let stream = self.stream.as_mut().ok_or_else(|| closed_error("READ"))?;
            let n = match timeout(socket_timeout, stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => {
                    return Err(Error::io(ErrorKind::Connection, "Read failed", err));
                }
                Err(_) => {
                    return Err(Error::new(
                        ErrorKind::Timeout,
                        "Timeout waiting for server reply",
                    ));
                }
            };

            if n == 0 {
                let kind = if self.phase == Phase::StartTls {
                    ErrorKind::Tls
                } else {
                    ErrorKind::Connection
                };
                let mut err = Error::new(kind, "Connection closed unexpectedly");
                let remainder = self.buffer.remainder();
                if !remainder.is_empty() {
                    err = err.with_response(remainder);
                }
                return Err(err);
            }
            self.buffer.feed(&chunk[..n]);
        }
    }

    fn ensure_open(&self, command: &str) -> Result<()> {
        if self.stage == Stage::Connected && self.stream.is_some() {
            Ok(())
        } else {
            Err(closed_error(command))
        }
    }

    /// Closes on fatal errors; returns to `Ready` after server refusals.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() || !self.pending.is_empty() {
                warn!(code = err.code(), error = %err, "Closing connection after error");
                self.abort();
            } else {
                debug!(code = err.code(), error = %err, "Server refused request");
                self.phase = Phase::Ready;
            }
        }
        result
    }

    /// Drops the socket without a shutdown handshake.
    fn abort(&mut self) {
        self.stream = None;
        self.pending.clear();
        self.buffer.clear();
        self.stage = Stage::Closed;
    }
}

fn closed_error(command: &str) -> Error {
    Error::new(ErrorKind::Connection, "Connection is closed").with_command(command)
}

/// Returns true if the reply text starts with exactly `code`.
fn is_code(text: &str, code: ReplyCode) -> bool {
    text.get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .is_some_and(|value| value == code.as_u16())
}

fn auth_outcome(text: String, command: &str) -> Result<()> {
    if text.starts_with('2') {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Auth, "Invalid login")
            .with_command(command)
            .with_response(text))
    }
}

/// Formats an IP as an EHLO address literal.
fn address_literal(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(ip) => format!("[{ip}]"),
        IpAddr::V6(ip) => format!("[IPv6:{ip}]"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_address_literal() {
        assert_eq!(address_literal("192.0.2.1".parse().unwrap()), "[192.0.2.1]");
        assert_eq!(address_literal("::1".parse().unwrap()), "[IPv6:::1]");
    }

    #[test]
    fn test_auth_outcome() {
        assert!(auth_outcome("235 2.7.0 Accepted".to_string(), "AUTH PLAIN").is_ok());

        let err = auth_outcome("535 5.7.8 Bad credentials".to_string(), "AUTH PLAIN").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.command(), Some("AUTH PLAIN"));
        assert_eq!(err.response_code(), Some(535));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_is_code() {
        assert!(is_code("334 VXNlcm5hbWU6", ReplyCode::AUTH_CONTINUE));
        assert!(is_code("354 Go ahead", ReplyCode::START_DATA));
        assert!(!is_code("250 OK", ReplyCode::START_DATA));
        assert!(!is_code("35", ReplyCode::START_DATA));
    }

    #[test]
    fn test_closed_error() {
        let err = closed_error("MAIL FROM");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.command(), Some("MAIL FROM"));
    }

    #[tokio::test]
    async fn test_stage_moves_from_init_once_socket_opens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SmtpConfig::builder("127.0.0.1").port(port).name("client.test").build();

        let mut client = Client::unopened(config, "127.0.0.1".to_string());
        assert_eq!(client.stage(), Stage::Init);
        let err = client.noop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(client.stage(), Stage::Init);

        let stream = client.open("127.0.0.1").await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();
        client.attach(stream);
        assert_eq!(client.stage(), Stage::Connected);
        assert_eq!(client.name(), "client.test");
        assert!(!client.is_secure());

        client.close().await;
        assert_eq!(client.stage(), Stage::Closed);
    }
}
