//! Outbound connection pools.
//!
//! # Responsibilities
//! - Hold one keep-alive HTTP client per protocol (plain, secure)
//! - Bound concurrent outbound sockets; callers queue when the bound is hit
//! - Retain idle connections for a configured duration
//! - Enable TCP_NODELAY on every outbound socket
//!
//! # Design Decisions
//! - Pools are a resource manager injected into each proxy instance; a
//!   process-wide default is available through [`ConnectionPools::shared`]
//! - The concurrency bound is a semaphore whose permit is held until the
//!   response body completes, mirroring the listener's connection permits

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::http::target::TargetDescriptor;

/// Process-wide pools, created on first use.
static SHARED_POOLS: OnceLock<ConnectionPools> = OnceLock::new();

/// Upstream protocol a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Plain,
    Secure,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Plain => write!(f, "http"),
            Protocol::Secure => write!(f, "https"),
        }
    }
}

/// Pool sizing and keep-alive settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum concurrent outbound sockets.
    pub max_sockets: usize,
    /// How long an idle connection is kept for reuse.
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sockets: 256,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_sockets: config.max_sockets.max(1),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }
}

#[derive(Clone)]
enum UpstreamClient {
    Plain(Client<HttpConnector, Body>),
    Secure(Client<HttpsConnector<HttpConnector>, Body>),
}

/// A protocol-scoped pool of reusable outbound connections.
pub struct ConnectionPool {
    protocol: Protocol,
    client: UpstreamClient,
    sockets: Arc<Semaphore>,
    settings: PoolSettings,
}

impl ConnectionPool {
    fn plain(settings: PoolSettings) -> Self {
        let client = Self::client_builder(&settings).build(Self::http_connector());
        Self::with_client(Protocol::Plain, UpstreamClient::Plain(client), settings)
    }

    fn secure(settings: PoolSettings) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let mut http = Self::http_connector();
        http.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_only()
            .enable_http1()
            .wrap_connector(http);

        let client = Self::client_builder(&settings).build(connector);
        Ok(Self::with_client(
            Protocol::Secure,
            UpstreamClient::Secure(client),
            settings,
        ))
    }

    fn with_client(protocol: Protocol, client: UpstreamClient, settings: PoolSettings) -> Self {
        Self {
            protocol,
            client,
            sockets: Arc::new(Semaphore::new(settings.max_sockets)),
            settings,
        }
    }

    fn http_connector() -> HttpConnector {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector
    }

    fn client_builder(settings: &PoolSettings) -> hyper_util::client::legacy::Builder {
        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_idle_timeout(settings.idle_timeout)
            .pool_max_idle_per_host(settings.max_sockets);
        builder
    }

    /// Wait for a free socket slot.
    ///
    /// The returned slot must be held until the exchange (including the
    /// response body) is finished.
    pub async fn acquire(&self) -> PoolSlot {
        if self.sockets.available_permits() == 0 {
            tracing::debug!(
                protocol = %self.protocol,
                max_sockets = self.settings.max_sockets,
                "Connection pool exhausted, queueing request"
            );
        }

        // The pool owns the semaphore and never calls `close` on it.
        let permit = self
            .sockets
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore closed unexpectedly");
        PoolSlot { _permit: permit }
    }

    /// Send a request over a pooled connection and wait for the response head.
    pub async fn send(
        &self,
        request: Request<Body>,
    ) -> std::result::Result<Response<Incoming>, hyper_util::client::legacy::Error> {
        match &self.client {
            UpstreamClient::Plain(client) => client.request(request).await,
            UpstreamClient::Secure(client) => client.request(request).await,
        }
    }

    /// Protocol served by this pool.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Currently free socket slots.
    pub fn available_sockets(&self) -> usize {
        self.sockets.available_permits()
    }

    /// Settings the pool was built with.
    pub fn settings(&self) -> PoolSettings {
        self.settings
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("protocol", &self.protocol)
            .field("available_sockets", &self.available_sockets())
            .field("settings", &self.settings)
            .finish()
    }
}

/// A held socket slot. Releases the slot when dropped.
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
}

/// The plain and secure pools handed to proxy instances.
#[derive(Debug, Clone)]
pub struct ConnectionPools {
    plain: Arc<ConnectionPool>,
    secure: Arc<ConnectionPool>,
}

impl ConnectionPools {
    /// Create an isolated pair of pools.
    pub fn new(settings: PoolSettings) -> Result<Self> {
        Ok(Self {
            plain: Arc::new(ConnectionPool::plain(settings)),
            secure: Arc::new(ConnectionPool::secure(settings)?),
        })
    }

    /// The process-wide pools with default settings.
    ///
    /// Every proxy instance that does not inject its own pools shares these.
    pub fn shared() -> Result<Self> {
        if let Some(pools) = SHARED_POOLS.get() {
            return Ok(pools.clone());
        }
        let pools = Self::new(PoolSettings::default())?;
        Ok(SHARED_POOLS.get_or_init(|| pools).clone())
    }

    /// The pool matching the target's protocol.
    pub fn for_target(&self, target: &TargetDescriptor) -> Arc<ConnectionPool> {
        if target.is_secure() {
            self.secure.clone()
        } else {
            self.plain.clone()
        }
    }

    /// The pool for a given protocol.
    pub fn get(&self, protocol: Protocol) -> Arc<ConnectionPool> {
        match protocol {
            Protocol::Plain => self.plain.clone(),
            Protocol::Secure => self.secure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pools(max_sockets: usize) -> ConnectionPools {
        ConnectionPools::new(PoolSettings {
            max_sockets,
            idle_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn selects_pool_by_target_protocol() {
        let pools = small_pools(4);
        let plain = TargetDescriptor::resolve("http://localhost:3000").unwrap();
        let secure = TargetDescriptor::resolve("https://localhost").unwrap();

        assert_eq!(pools.for_target(&plain).protocol(), Protocol::Plain);
        assert_eq!(pools.for_target(&secure).protocol(), Protocol::Secure);
        assert!(Arc::ptr_eq(&pools.for_target(&plain), &pools.get(Protocol::Plain)));
    }

    #[tokio::test]
    async fn slots_are_bounded_and_released() {
        let pools = small_pools(1);
        let pool = pools.get(Protocol::Plain);

        let slot = pool.acquire().await;
        assert_eq!(pool.available_sockets(), 0);

        let queued = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(queued.is_err(), "second acquire should wait for a free slot");

        drop(slot);
        assert_eq!(pool.available_sockets(), 1);
        let _slot = pool.acquire().await;
    }

    #[tokio::test]
    async fn shared_pools_are_process_wide() {
        let a = ConnectionPools::shared().unwrap();
        let b = ConnectionPools::shared().unwrap();
        assert!(Arc::ptr_eq(&a.get(Protocol::Plain), &b.get(Protocol::Plain)));
        assert!(Arc::ptr_eq(&a.get(Protocol::Secure), &b.get(Protocol::Secure)));
        assert_eq!(a.get(Protocol::Plain).settings(), PoolSettings::default());
    }

    #[test]
    fn settings_from_config() {
        let config = PoolConfig {
            max_sockets: 0,
            idle_timeout_secs: 5,
        };
        let settings = PoolSettings::from(&config);
        assert_eq!(settings.max_sockets, 1);
        assert_eq!(settings.idle_timeout, Duration::from_secs(5));
    }
}
