//! Scripted loopback SMTP server for integration tests.
//!
//! Each test drives the server side line by line, so the exact command
//! order the client produces is asserted on the server task.

#![allow(dead_code, clippy::unwrap_used)]

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use mailwright_smtp::{SmtpConfig, SmtpConfigBuilder};

/// Server side of one accepted connection, plain or TLS.
pub struct ServerConn<S = TcpStream> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConn<S> {
    /// Writes raw reply text.
    pub async fn send(&mut self, text: &str) {
        let writer = self.stream.get_mut();
        writer.write_all(text.as_bytes()).await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Reads one command line without CRLF; `None` once the client is gone.
    pub async fn line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.stream.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Reads one line and asserts its prefix.
    pub async fn expect(&mut self, prefix: &str) -> String {
        let line = self.line().await.unwrap_or_default();
        assert!(
            line.starts_with(prefix),
            "expected {prefix:?}, got {line:?}"
        );
        line
    }

    /// Answers EHLO with the given capability lines.
    pub async fn ehlo(&mut self, capabilities: &[&str]) {
        self.expect("EHLO ").await;
        let mut reply = String::new();
        if capabilities.is_empty() {
            reply.push_str("250 localhost\r\n");
        } else {
            reply.push_str("250-localhost greets you\r\n");
            for (idx, capability) in capabilities.iter().enumerate() {
                let sep = if idx + 1 == capabilities.len() { ' ' } else { '-' };
                reply.push_str(&format!("250{sep}{capability}\r\n"));
            }
        }
        self.send(&reply).await;
    }

    /// Reads a DATA payload up to the terminating dot line.
    ///
    /// Lines are returned exactly as received, still dot-stuffed.
    pub async fn data(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.line().await {
            if line == "." {
                break;
            }
            lines.push(line);
        }
        lines
    }

    /// Reads until the client closes the socket.
    pub async fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.line().await {
            lines.push(line);
        }
        lines
    }
}

impl ServerConn<TcpStream> {
    /// Runs the server side of the TLS handshake after a `220` STARTTLS reply.
    pub async fn accept_tls(
        self,
        acceptor: &TlsAcceptor,
    ) -> io::Result<ServerConn<TlsStream<TcpStream>>> {
        let stream = acceptor.accept(self.stream.into_inner()).await?;
        Ok(ServerConn {
            stream: BufReader::new(stream),
        })
    }
}

/// TLS acceptor with a fresh self-signed certificate for `localhost`.
pub fn tls_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let der = CertificateDer::from(cert.serialize_der().unwrap());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![der], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Starts a server that accepts one connection and runs `script` on it.
pub async fn serve<F, Fut>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(ServerConn) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        script(ServerConn {
            stream: BufReader::new(socket),
        })
        .await;
    });
    (port, handle)
}

/// Client configuration pointed at the loopback server.
pub fn config(port: u16) -> SmtpConfigBuilder {
    SmtpConfig::builder("127.0.0.1")
        .port(port)
        .name("client.test")
        .greeting_timeout(Duration::from_secs(5))
        .socket_timeout(Duration::from_secs(5))
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
