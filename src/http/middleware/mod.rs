//! Request pipeline: an ordered list of stages ending in the forwarding engine.
//!
//! # Data Flow
//! ```text
//! Request
//!     → logger.rs (optional, always first)
//!     → attack detectors (in configured order)
//!     → custom stages (in insertion order)
//!     → ForwardingEngine (terminal, never continues)
//! ```
//!
//! # Design Decisions
//! - Continuation passing: each stage receives a [`Next`] that it consumes
//!   to proceed, so a stage can call it at most once
//! - A stage that returns without calling [`Next::run`] ends the chain and
//!   its response goes to the client
//! - Stages that care about the outcome attach a completion hook to the
//!   response instead of wrapping the transport

pub mod logger;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::forward::ForwardingEngine;

pub use logger::{LogSink, RequestLogEvent, RequestLogger, TracingLogSink};

/// One step of the pipeline.
pub trait Stage: Send + Sync + 'static {
    /// Handle `request`, usually by awaiting `next.run(request)`.
    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// Continuation handed to a stage: the rest of the pipeline.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    terminal: &'a ForwardingEngine,
}

impl<'a> Next<'a> {
    /// Run the remaining stages, then forward upstream.
    pub async fn run(self, request: Request<Body>) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    terminal: self.terminal,
                };
                stage.handle(request, next).await
            }
            None => self.terminal.forward(request).await,
        }
    }
}

/// An assembled pipeline. Immutable once built.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    terminal: ForwardingEngine,
}

impl Pipeline {
    /// Pipeline that only forwards.
    pub fn new(terminal: ForwardingEngine) -> Self {
        Self {
            stages: Vec::new(),
            terminal,
        }
    }

    /// Append a stage before the forwarding engine.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn forwarding_engine(&self) -> &ForwardingEngine {
        &self.terminal
    }

    /// Run `request` through every stage.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        Next {
            stages: &self.stages,
            terminal: &self.terminal,
        }
        .run(request)
        .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("terminal", &self.terminal)
            .finish()
    }
}
