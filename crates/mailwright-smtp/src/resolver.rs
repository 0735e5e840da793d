//! Host name resolution with a TTL cache.
//!
//! The client resolves the configured host through a [`Resolver`] before
//! opening the socket. [`CachedResolver`] is the default; share one
//! instance through an `Arc` so every client benefits from the cache.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

/// Default lifetime of a cached lookup.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Result of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Address (or host name, after a fallback) to connect to.
    pub host: String,
    /// Original host name for TLS SNI; `None` for IP literals.
    pub servername: Option<String>,
}

/// Resolves host names for the SMTP client.
#[async_trait]
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Resolves `host`.
    ///
    /// # Errors
    ///
    /// Returns an `EDNS` error if the host cannot be resolved.
    async fn resolve(&self, host: &str) -> Result<Resolved>;
}

#[derive(Debug, Clone)]
struct CachedEntry {
    address: IpAddr,
    expires_at: Instant,
}

/// Resolver backed by the system resolver with a TTL cache.
///
/// Expired entries are still served when a fresh lookup fails. On
/// transient failures without a cached entry the original host name is
/// returned so the connect attempt can resolve it itself.
#[derive(Debug)]
pub struct CachedResolver {
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedEntry>>,
}

impl Default for CachedResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CachedResolver {
    /// Creates a resolver with the given cache lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    fn cached(&self, host: &str) -> Option<CachedEntry> {
        self.cache.lock().get(host).cloned()
    }

    fn store(&self, host: &str, address: IpAddr) {
        self.cache.lock().insert(
            host.to_string(),
            CachedEntry {
                address,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn lookup(host: &str) -> io::Result<IpAddr> {
        let mut addrs = tokio::net::lookup_host((host, 0)).await?;
        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
        })
    }
}

#[async_trait]
impl Resolver for CachedResolver {
    async fn resolve(&self, host: &str) -> Result<Resolved> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Resolved {
                host: ip.to_string(),
                servername: None,
            });
        }

        let key = host.to_lowercase();
        let cached = self.cached(&key);
        if let Some(entry) = &cached
            && entry.expires_at > Instant::now()
        {
            debug!(host, address = %entry.address, "Resolved from cache");
            return Ok(Resolved {
                host: entry.address.to_string(),
                servername: Some(host.to_string()),
            });
        }

        match Self::lookup(host).await {
            Ok(address) => {
                debug!(host, %address, "Resolved");
                self.store(&key, address);
                Ok(Resolved {
                    host: address.to_string(),
                    servername: Some(host.to_string()),
                })
            }
            Err(err) => {
                if let Some(entry) = cached {
                    warn!(host, error = %err, "Lookup failed, using expired cache entry");
                    return Ok(Resolved {
                        host: entry.address.to_string(),
                        servername: Some(host.to_string()),
                    });
                }
                if is_transient(&err) {
                    warn!(host, error = %err, "Lookup failed, connecting by name");
                    return Ok(Resolved {
                        host: host.to_string(),
                        servername: Some(host.to_string()),
                    });
                }
                Err(Error::io(ErrorKind::Dns, &format!("Failed to resolve {host}"), err)
                    .with_command("CONN"))
            }
        }
    }
}

/// Returns true for lookup failures worth retrying at connect time.
fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("temporary failure") || message.contains("try again")
}
