//! Request/response correlation — await one settled outcome per request.
//!
//! Raw dispatch is fire-and-forget: a request action goes down the pipeline
//! and its response comes back as a separate dispatch, some time later. The
//! [`CorrelateInterceptor`] bridges the two. For an eligible request it hands
//! the caller a [`PendingResponse`] instead of the pipeline's return value,
//! and settles that future exactly once when the matching response action
//! passes through: fulfilled with the response if its kind is the canonical
//! success kind of the request, rejected with it otherwise.
//!
//! Matching is by an opaque correlation id stamped onto the forwarded copy of
//! the request at admission time. Whoever executes the request must build the
//! response from the request action as it came out of the pipeline, so the id
//! travels back inside `meta.request_action` (the [`Action::success_for`] and
//! [`Action::error_for`] constructors do this).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::action::{self, Action};
use crate::pipeline::{Interceptor, Next, Outcome};

/// A response action that was not the canonical success of its request.
///
/// The caller receives the response action itself and is responsible for
/// interpreting it; this type only gives it an error shape.
#[derive(Debug, Error)]
#[error("request settled with non-success response `{}`", .response.kind)]
pub struct Rejection {
    /// The response action the request settled with.
    pub response: Action,
}

type Settlement = Result<Action, Rejection>;

/// The deferred outcome of a promisified request.
///
/// Settles exactly once, when the matching response action is dispatched. A
/// correlation whose response never arrives stays pending indefinitely —
/// there is no timeout or cancellation path, and a settlement channel that
/// can no longer be written (its interceptor was dropped) is treated the same
/// way. The future is fused: it may be polled any number of times after the
/// channel closes and stays pending.
#[derive(Debug)]
pub struct PendingResponse {
    // Taken on channel close; a completed receiver must not be polled again.
    rx: Option<oneshot::Receiver<Settlement>>,
}

impl Future for PendingResponse {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(settled)) => Poll::Ready(settled),
            // Channel closed without a settlement: the correlation can never
            // settle now, so it stays pending rather than inventing an error.
            Poll::Ready(Err(_)) => {
                this.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Whether a request action participates in promisification.
///
/// With `auto` enabled every request is eligible unless it carries
/// `meta.as_promise == false`; with `auto` disabled a request must carry
/// `meta.as_promise == true` to opt in.
pub fn should_promisify(action: &Action, auto: bool) -> bool {
    if auto {
        action.meta.as_promise != Some(false)
    } else {
        action.meta.as_promise == Some(true)
    }
}

/// The correlation table interceptor.
///
/// Owns a table of in-flight correlations keyed by an opaque monotonically
/// increasing id. An entry is created when an eligible request is admitted
/// and removed the moment its response settles it; a response with no
/// matching entry is forwarded untouched.
pub struct CorrelateInterceptor {
    auto: bool,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Settlement>>>,
}

impl CorrelateInterceptor {
    /// Creates the interceptor. `auto` makes promisification opt-out instead
    /// of opt-in; see [`should_promisify`].
    pub fn new(auto: bool) -> Self {
        Self {
            auto,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of correlations still waiting for their response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Interceptor for CorrelateInterceptor {
    fn intercept(&self, action: Action, next: Next) -> Outcome {
        if action::is_request_action(&action) && should_promisify(&action, self.auto) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();

            let mut stamped = action;
            stamped.meta.correlation_id = Some(id);
            lock(&self.pending).insert(id, tx);
            trace!(kind = %stamped.kind, id, "pending correlation registered");

            // The caller observes the settlement, not the pipeline's return.
            let _ = next.run(stamped);
            return Outcome::Pending(PendingResponse { rx: Some(rx) });
        }

        if let Some(request) = action::request_action_from_response(&action) {
            if should_promisify(request, self.auto) {
                let entry = request
                    .meta
                    .correlation_id
                    .and_then(|id| lock(&self.pending).remove(&id));

                match entry {
                    Some(tx) => {
                        let settled = if action.kind == action::success(&request.kind) {
                            Ok(action.clone())
                        } else {
                            Err(Rejection {
                                response: action.clone(),
                            })
                        };
                        debug!(kind = %action.kind, "settling pending correlation");
                        // The receiver may already be gone; nothing to do then.
                        let _ = tx.send(settled);
                    }
                    None => {
                        // Never registered, or already settled.
                        trace!(kind = %action.kind, "no pending correlation for response");
                    }
                }
            }
        }

        next.run(action)
    }
}

// No code panics while holding the table lock, so a poisoned lock still
// guards a consistent table.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
