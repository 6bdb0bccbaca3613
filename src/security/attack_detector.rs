//! Per-path, per-status attack detection.
//!
//! # Responsibilities
//! - Count responses that match a watched path and status code, per client IP
//! - Keep the counts in a sliding time window, purged lazily on each access
//! - Fire a caller-supplied trigger once an IP reaches the threshold
//!
//! # State Machine (per IP)
//! ```text
//! Idle ──hit──▶ Accumulating (1..threshold-1) ──hit reaching threshold──▶ trigger ──▶ Idle
//! ```
//!
//! # Design Decisions
//! - Hits are only counted once the response has been sent (completion hook)
//! - The window for an IP is discarded on breach; no gradual decay
//! - Windows live in a sharded map, so different IPs do not contend
//! - The trigger runs outside the shard lock; its errors and panics are logged
//!   and never reach the response path

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use regex::Regex;
use serde::Serialize;

use crate::config::AttackDetectorEntry;
use crate::error::{BoxError, ProxyError, Result};
use crate::http::completion::on_complete;
use crate::http::middleware::{Next, Stage};
use crate::http::request::{client_ip, user_agent};
use crate::observability::metrics;

/// Default sliding window length.
pub const DEFAULT_TIME_WINDOW_MS: u64 = 1000;

/// Callback invoked on a threshold breach.
pub type TriggerCallback =
    Arc<dyn Fn(&TriggerEvent) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Details of a threshold breach, handed once to the trigger callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerEvent {
    /// Client IP that reached the threshold.
    pub ip: String,
    /// Hits counted in the window; always equal to the threshold.
    pub hits: usize,
    /// Request path of the hit that reached the threshold.
    pub path: String,
    /// Milliseconds since the Unix epoch at the breach.
    pub timestamp_ms: u64,
    /// User-Agent of the breaching request.
    pub user_agent: Option<String>,
}

/// How a detector matches request paths.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Exact string equality.
    Exact(String),
    /// Regular expression search.
    Pattern(Regex),
}

impl PathMatcher {
    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(PathMatcher::Pattern)
            .map_err(|e| ProxyError::invalid_detector(format!("invalid path pattern: {}", e)))
    }

    /// Whether `path` (without query string) matches.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(expected) => expected == path,
            PathMatcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl std::fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathMatcher::Exact(path) => write!(f, "{}", path),
            PathMatcher::Pattern(regex) => write!(f, "{}", regex.as_str()),
        }
    }
}

/// Validated, immutable attack detector configuration.
#[derive(Clone)]
pub struct AttackDetectorConfig {
    path: PathMatcher,
    status_code: u16,
    threshold: usize,
    time_window_ms: u64,
    on_trigger: TriggerCallback,
}

impl AttackDetectorConfig {
    /// Start building a configuration.
    pub fn builder() -> AttackDetectorConfigBuilder {
        AttackDetectorConfigBuilder::default()
    }

    /// Build a configuration from a config-file entry with the given trigger.
    pub fn from_entry(entry: &AttackDetectorEntry, on_trigger: TriggerCallback) -> Result<Self> {
        let mut builder = Self::builder()
            .status_code(entry.status_code)
            .threshold(entry.threshold)
            .time_window_ms(entry.time_window_ms);
        builder.on_trigger = Some(on_trigger);

        match (&entry.path, &entry.path_pattern) {
            (Some(_), Some(_)) => Err(ProxyError::invalid_detector(
                "set either path or path_pattern, not both",
            )),
            (Some(path), None) => builder.path(path.as_str()).build(),
            (None, Some(pattern)) => builder.path_pattern(pattern.as_str()).build(),
            (None, None) => builder.build(),
        }
    }

    pub fn path(&self) -> &PathMatcher {
        &self.path
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

impl std::fmt::Debug for AttackDetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttackDetectorConfig")
            .field("path", &self.path)
            .field("status_code", &self.status_code)
            .field("threshold", &self.threshold)
            .field("time_window_ms", &self.time_window_ms)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AttackDetectorConfig`]. Every field except the time window is required.
#[derive(Default)]
pub struct AttackDetectorConfigBuilder {
    path: Option<String>,
    path_pattern: Option<String>,
    status_code: Option<u16>,
    threshold: Option<u32>,
    time_window_ms: Option<u64>,
    on_trigger: Option<TriggerCallback>,
}

impl AttackDetectorConfigBuilder {
    /// Watch an exact request path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self.path_pattern = None;
        self
    }

    /// Watch paths matching a regular expression.
    pub fn path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.path_pattern = Some(pattern.into());
        self.path = None;
        self
    }

    /// Response status code that counts as a hit.
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Hits within the window that fire the trigger.
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Window length in milliseconds (default 1000).
    pub fn time_window_ms(mut self, time_window_ms: u64) -> Self {
        self.time_window_ms = Some(time_window_ms);
        self
    }

    /// Callback invoked on breach.
    pub fn on_trigger<F>(mut self, on_trigger: F) -> Self
    where
        F: Fn(&TriggerEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(on_trigger));
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<AttackDetectorConfig> {
        let path = match (self.path, self.path_pattern) {
            (Some(path), _) if path.is_empty() => {
                return Err(ProxyError::invalid_detector("path must not be empty"))
            }
            (Some(path), _) => PathMatcher::Exact(path),
            (None, Some(pattern)) => PathMatcher::pattern(&pattern)?,
            (None, None) => return Err(ProxyError::invalid_detector("path is required")),
        };

        let status_code = self
            .status_code
            .ok_or_else(|| ProxyError::invalid_detector("status_code is required"))?;
        StatusCode::from_u16(status_code).map_err(|_| {
            ProxyError::invalid_detector(format!("{} is not a valid HTTP status", status_code))
        })?;

        let threshold = match self.threshold {
            None => return Err(ProxyError::invalid_detector("threshold is required")),
            Some(0) => {
                return Err(ProxyError::invalid_detector("threshold must be greater than 0"))
            }
            Some(t) => t as usize,
        };

        let time_window_ms = self.time_window_ms.unwrap_or(DEFAULT_TIME_WINDOW_MS);
        if time_window_ms == 0 {
            return Err(ProxyError::invalid_detector(
                "time_window_ms must be greater than 0",
            ));
        }

        let on_trigger = self
            .on_trigger
            .ok_or_else(|| ProxyError::invalid_detector("on_trigger is required"))?;

        Ok(AttackDetectorConfig {
            path,
            status_code,
            threshold,
            time_window_ms,
            on_trigger,
        })
    }
}

/// Trigger used for config-file detectors: logs the event.
pub fn log_trigger() -> TriggerCallback {
    Arc::new(|event: &TriggerEvent| {
        tracing::warn!(
            ip = %event.ip,
            hits = event.hits,
            path = %event.path,
            timestamp_ms = event.timestamp_ms,
            user_agent = event.user_agent.as_deref().unwrap_or("-"),
            "Attack detected"
        );
        Ok(())
    })
}

/// Timestamps of matching hits for one IP, oldest first.
#[derive(Debug, Default)]
struct HitWindow {
    hits: VecDeque<u64>,
}

impl HitWindow {
    /// Drop hits that are `window_ms` or more older than `now_ms`.
    fn purge(&mut self, now_ms: u64, window_ms: u64) {
        while let Some(&oldest) = self.hits.front() {
            if now_ms.saturating_sub(oldest) >= window_ms {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

struct DetectorState {
    config: AttackDetectorConfig,
    windows: DashMap<String, HitWindow>,
}

/// A running attack detector. Cloning shares the hit windows.
#[derive(Clone)]
pub struct AttackDetector {
    inner: Arc<DetectorState>,
}

impl AttackDetector {
    /// Create a detector with empty hit windows.
    pub fn new(config: AttackDetectorConfig) -> Self {
        Self {
            inner: Arc::new(DetectorState {
                config,
                windows: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &AttackDetectorConfig {
        &self.inner.config
    }

    /// Whether a completed request counts as a hit.
    pub fn matches(&self, path: &str, status: u16) -> bool {
        let config = &self.inner.config;
        status == config.status_code && config.path.matches(path)
    }

    /// Record a completed request at the current time.
    ///
    /// Returns the trigger event if this request reached the threshold.
    pub fn observe(
        &self,
        ip: &str,
        path: &str,
        status: u16,
        user_agent: Option<&str>,
    ) -> Option<TriggerEvent> {
        self.observe_at(ip, path, status, user_agent, now_ms())
    }

    /// Record a completed request at `now_ms` (milliseconds since the epoch).
    pub fn observe_at(
        &self,
        ip: &str,
        path: &str,
        status: u16,
        user_agent: Option<&str>,
        now_ms: u64,
    ) -> Option<TriggerEvent> {
        if !self.matches(path, status) {
            return None;
        }

        let config = &self.inner.config;
        let hits = {
            let mut window = self.inner.windows.entry(ip.to_string()).or_default();
            window.purge(now_ms, config.time_window_ms);
            window.hits.push_back(now_ms);

            let count = window.hits.len();
            if count >= config.threshold {
                window.hits.clear();
                Some(count)
            } else {
                None
            }
        };

        let hits = match hits {
            Some(hits) => hits,
            None => {
                tracing::trace!(ip = %ip, path = %path, watched = %config.path, "Attack detector hit");
                return None;
            }
        };

        self.inner.windows.remove_if(ip, |_, w| w.hits.is_empty());

        let event = TriggerEvent {
            ip: ip.to_string(),
            hits,
            path: path.to_string(),
            timestamp_ms: now_ms,
            user_agent: user_agent.map(String::from),
        };

        tracing::warn!(
            ip = %event.ip,
            hits = event.hits,
            path = %event.path,
            status,
            "Attack detector threshold reached"
        );
        metrics::record_attack_trigger(&config.path.to_string());

        if let Err(e) = self.fire(&event) {
            tracing::error!(ip = %event.ip, path = %event.path, error = %e, "Trigger callback failed");
        }

        Some(event)
    }

    fn fire(&self, event: &TriggerEvent) -> Result<()> {
        let callback = &self.inner.config.on_trigger;
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProxyError::TriggerCallback {
                message: e.to_string(),
            }),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "callback panicked".to_string());
                Err(ProxyError::TriggerCallback { message })
            }
        }
    }

    /// Hits currently counted for `ip`, after purging expired ones.
    pub fn tracked_hits(&self, ip: &str) -> usize {
        self.tracked_hits_at(ip, now_ms())
    }

    /// Hits counted for `ip` at `now_ms`, after purging expired ones.
    pub fn tracked_hits_at(&self, ip: &str, now_ms: u64) -> usize {
        let hits = match self.inner.windows.get_mut(ip) {
            Some(mut window) => {
                window.purge(now_ms, self.inner.config.time_window_ms);
                window.hits.len()
            }
            None => return 0,
        };
        if hits == 0 {
            self.inner.windows.remove_if(ip, |_, window| window.hits.is_empty());
        }
        hits
    }

    /// Number of IPs with a hit window.
    pub fn tracked_ips(&self) -> usize {
        self.inner.windows.len()
    }
}

impl std::fmt::Debug for AttackDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttackDetector")
            .field("config", &self.inner.config)
            .field("tracked_ips", &self.tracked_ips())
            .finish()
    }
}

impl Stage for AttackDetector {
    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path().to_string();
            if !self.inner.config.path.matches(&path) {
                return next.run(request).await;
            }

            let ip = client_ip(&request);
            let agent = user_agent(&request);
            let response = next.run(request).await;

            let status = response.status().as_u16();
            if status != self.inner.config.status_code {
                return response;
            }

            let detector = self.clone();
            on_complete(response, move || {
                detector.observe(&ip, &path, status, agent.as_deref());
            })
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
