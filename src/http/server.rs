//! Proxy instance construction and serving.
//!
//! # Responsibilities
//! - Validate construction options (the target above all) before any socket opens
//! - Assemble the pipeline: logger, detectors, custom stages, forwarding
//! - Expose the pipeline as an Axum router for embedding
//! - Serve standalone with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::http::completion::on_complete;
use crate::http::forward::{ForwardingEngine, DEFAULT_UPSTREAM_TIMEOUT};
use crate::http::middleware::{LogSink, Pipeline, RequestLogger, Stage, TracingLogSink};
use crate::http::request::RequestId;
use crate::http::target::TargetDescriptor;
use crate::net::pool::{ConnectionPools, PoolSettings};
use crate::observability::metrics;
use crate::security::attack_detector::{log_trigger, AttackDetector, AttackDetectorConfig};

/// Default port for standalone mode.
pub const DEFAULT_PORT: u16 = 8080;

/// Options for a [`ReverseProxy`].
///
/// Only the target is required:
///
/// ```no_run
/// use sentinel_proxy::{ProxyOptions, ReverseProxy};
///
/// let proxy = ReverseProxy::new(
///     ProxyOptions::new("http://127.0.0.1:3000").change_origin(true),
/// )?;
/// # Ok::<(), sentinel_proxy::ProxyError>(())
/// ```
#[derive(Clone)]
pub struct ProxyOptions {
    target: Option<String>,
    change_origin: bool,
    port: Option<u16>,
    logger: Option<Arc<dyn LogSink>>,
    attack_detectors: Vec<AttackDetectorConfig>,
    stages: Vec<Arc<dyn Stage>>,
    upstream_timeout: Duration,
    pools: Option<ConnectionPools>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            target: None,
            change_origin: false,
            port: None,
            logger: None,
            attack_detectors: Vec::new(),
            stages: Vec::new(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            pools: None,
        }
    }
}

impl ProxyOptions {
    /// Options forwarding to `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Rewrite the outbound Host header to the target's host.
    pub fn change_origin(mut self, change_origin: bool) -> Self {
        self.change_origin = change_origin;
        self
    }

    /// Port used by [`ReverseProxy::listen`].
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Report every completed request to `sink`.
    pub fn logger(mut self, sink: impl LogSink) -> Self {
        self.logger = Some(Arc::new(sink));
        self
    }

    /// Append one attack detector.
    pub fn attack_detector(mut self, config: AttackDetectorConfig) -> Self {
        self.attack_detectors.push(config);
        self
    }

    /// Append several attack detectors, evaluated in order.
    pub fn attack_detectors(mut self, configs: impl IntoIterator<Item = AttackDetectorConfig>) -> Self {
        self.attack_detectors.extend(configs);
        self
    }

    /// Insert a custom stage after the built-in ones.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Deadline for the upstream response head (default 30 s).
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Use these pools instead of the process-wide ones.
    pub fn pools(mut self, pools: ConnectionPools) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Options built from a loaded configuration file.
    ///
    /// Config-file detectors log their trigger events.
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let mut options = Self {
            target: config.target.clone(),
            change_origin: config.change_origin,
            port: Some(config.listener.port),
            upstream_timeout: Duration::from_millis(config.timeouts.upstream_ms),
            pools: Some(ConnectionPools::new(PoolSettings::from(&config.pool))?),
            ..Self::default()
        };

        if config.logging.enabled {
            options = options.logger(TracingLogSink);
        }

        for entry in &config.attack_detectors {
            options = options.attack_detector(AttackDetectorConfig::from_entry(entry, log_trigger())?);
        }

        Ok(options)
    }
}

impl std::fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("target", &self.target)
            .field("change_origin", &self.change_origin)
            .field("port", &self.port)
            .field("logger", &self.logger.is_some())
            .field("attack_detectors", &self.attack_detectors)
            .field("stages", &self.stages.len())
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

/// A fixed-target reverse proxy instance. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ReverseProxy {
    pipeline: Arc<Pipeline>,
    detectors: Vec<AttackDetector>,
    port: u16,
}

impl ReverseProxy {
    /// Build a proxy instance.
    ///
    /// Fails with [`ProxyError::TargetRequired`] or [`ProxyError::InvalidTarget`]
    /// before anything is bound or connected.
    pub fn new(options: ProxyOptions) -> Result<Self> {
        let target = options.target.as_deref().ok_or(ProxyError::TargetRequired)?;
        let target = Arc::new(TargetDescriptor::resolve(target)?);

        let pools = match options.pools {
            Some(pools) => pools,
            None => ConnectionPools::shared()?,
        };
        let engine = ForwardingEngine::new(
            target.clone(),
            options.change_origin,
            &pools,
            options.upstream_timeout,
        );

        let mut pipeline = Pipeline::new(engine);
        if let Some(sink) = options.logger {
            pipeline = pipeline.with_stage(Arc::new(RequestLogger::new(sink)));
        }

        let detectors: Vec<AttackDetector> = options
            .attack_detectors
            .into_iter()
            .map(AttackDetector::new)
            .collect();
        for detector in &detectors {
            pipeline = pipeline.with_stage(Arc::new(detector.clone()));
        }

        for stage in options.stages {
            pipeline = pipeline.with_stage(stage);
        }

        tracing::debug!(
            target_url = %target,
            change_origin = options.change_origin,
            detectors = detectors.len(),
            stages = pipeline.len(),
            "Proxy instance created"
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            detectors,
            port: options.port.unwrap_or(DEFAULT_PORT),
        })
    }

    /// Build a proxy instance from a loaded configuration file.
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        Self::new(ProxyOptions::from_config(config)?)
    }

    /// The fixed target.
    pub fn target(&self) -> &TargetDescriptor {
        self.pipeline.forwarding_engine().target()
    }

    /// The attached detectors, in evaluation order.
    pub fn attack_detectors(&self) -> &[AttackDetector] {
        &self.detectors
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        if request.extensions().get::<RequestId>().is_none() {
            request.extensions_mut().insert(RequestId::new());
        }

        let started = Instant::now();
        let method = request.method().to_string();
        let response = self.pipeline.handle(request).await;
        let status = response.status().as_u16();

        on_complete(response, move || {
            metrics::record_request(&method, status, started.elapsed());
        })
    }

    /// The proxy as an Axum router. Every path and method is forwarded.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, target_url = %self.target(), "Proxy listening");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Proxy stopped");
        Ok(())
    }

    /// Bind `0.0.0.0` on the configured port and serve.
    pub async fn listen(self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.serve(listener, shutdown).await
    }
}

async fn proxy_handler(State(proxy): State<ReverseProxy>, request: Request<Body>) -> Response {
    proxy.handle(request).await
}
