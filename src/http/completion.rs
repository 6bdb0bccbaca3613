//! Response completion hooks.
//!
//! Stages that need to act once a response has been fully sent (the request
//! logger, the attack detectors, the pool slot release) register a hook with
//! [`on_complete`]. A response carries one hook list, stored in its
//! extensions, and its body is wrapped in a single [`CompletionBody`].
//!
//! # Design Decisions
//! - Hooks run in pipeline order: a hook registered by an outer stage runs
//!   before the hooks of the stages it wraps
//! - The list runs exactly once: when the body reports end of stream, fails,
//!   or is dropped by the transport, whichever comes first
//! - A panicking hook is logged and the remaining hooks still run

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::response::Response;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

type Hook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct HookList {
    hooks: VecDeque<Hook>,
    fired: bool,
}

/// The hooks registered on one response, shared by its body and extensions.
#[derive(Clone, Default)]
struct CompletionHooks(Arc<Mutex<HookList>>);

impl CompletionHooks {
    fn lock(&self) -> MutexGuard<'_, HookList> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `hook` before the hooks already registered. Hands it back once the list has fired.
    fn push_front(&self, hook: Hook) -> Result<(), Hook> {
        let mut list = self.lock();
        if list.fired {
            return Err(hook);
        }
        list.hooks.push_front(hook);
        Ok(())
    }

    fn fire(&self) {
        let hooks = {
            let mut list = self.lock();
            list.fired = true;
            std::mem::take(&mut list.hooks)
        };

        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                tracing::error!("Response completion hook panicked");
            }
        }
    }
}

/// A body wrapper that runs its hooks when the body is finished.
pub struct CompletionBody {
    inner: Body,
    hooks: CompletionHooks,
    done: bool,
}

impl CompletionBody {
    /// Wrap `inner`, running `hook` once the body completes.
    pub fn new(inner: Body, hook: impl FnOnce() + Send + 'static) -> Self {
        let hooks = CompletionHooks::default();
        let _ = hooks.push_front(Box::new(hook));
        Self::with_hooks(inner, hooks)
    }

    fn with_hooks(inner: Body, hooks: CompletionHooks) -> Self {
        Self {
            inner,
            hooks,
            done: false,
        }
    }

    fn fire(&mut self) {
        if !self.done {
            self.done = true;
            self.hooks.fire();
        }
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => self.fire(),
            Poll::Ready(Some(Ok(_))) if self.inner.is_end_stream() => self.fire(),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Register a hook to run once `response` has been sent, keeping status and headers.
///
/// Hooks added later run earlier, so a stage that calls this on the response
/// returned by its continuation observes completion before the stages after it.
pub fn on_complete(mut response: Response, hook: impl FnOnce() + Send + 'static) -> Response {
    let mut hook: Hook = Box::new(hook);

    let existing = response.extensions().get::<CompletionHooks>().cloned();
    if let Some(hooks) = existing {
        match hooks.push_front(hook) {
            Ok(()) => return response,
            Err(returned) => hook = returned,
        }
    }

    let hooks = CompletionHooks::default();
    let _ = hooks.push_front(hook);
    response.extensions_mut().insert(hooks.clone());
    response.map(|body| Body::new(CompletionBody::with_hooks(body, hooks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn fires_once_after_body_is_read() {
        let (count, hook) = counter();
        let response = on_complete(Response::new(Body::from("hello")), hook);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fires_on_drop_when_never_polled() {
        let (count, hook) = counter();
        let response = on_complete(Response::new(Body::empty()), hook);
        drop(response);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    fn recorder(
        order: &Arc<std::sync::Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl FnOnce() + Send + 'static {
        let order = order.clone();
        move || order.lock().unwrap().push(name)
    }

    #[tokio::test]
    async fn later_hooks_run_first() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let response = on_complete(Response::new(Body::from("x")), recorder(&order, "inner"));
        let response = on_complete(response, recorder(&order, "middle"));
        let response = on_complete(response, recorder(&order, "outer"));

        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["outer", "middle", "inner"]);
    }

    #[test]
    fn hooks_run_in_order_on_drop() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let response = on_complete(Response::new(Body::empty()), recorder(&order, "inner"));
        let response = on_complete(response, recorder(&order, "outer"));
        drop(response);
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn panicking_hook_does_not_break_body_or_other_hooks() {
        let (count, hook) = counter();
        let response = on_complete(Response::new(Body::from("hello")), hook);
        let response = on_complete(response, || panic!("hook failed"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_added_after_completion_gets_a_fresh_list() {
        let (first, hook) = counter();
        let response = on_complete(Response::new(Body::from("x")), hook);
        let (parts, body) = response.into_parts();
        drop(body);
        assert_eq!(first.load(Ordering::SeqCst), 1);

        let (second, hook) = counter();
        let response = on_complete(Response::from_parts(parts, Body::from("y")), hook);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        drop(response);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preserves_status_and_headers() {
        let (_count, hook) = counter();
        let response = Response::builder()
            .status(404)
            .header("x-upstream", "1")
            .body(Body::from("missing"))
            .unwrap();
        let wrapped = on_complete(response, hook);
        assert_eq!(wrapped.status(), 404);
        assert_eq!(wrapped.headers()["x-upstream"], "1");
        assert_eq!(wrapped.body().size_hint().exact(), Some(7));
    }
}
