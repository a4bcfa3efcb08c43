//! Interceptor pipeline — composable single-step action interception.
//!
//! This module defines the core types for building an ordered interceptor
//! stack. Each interceptor wraps the next stage, enabling action inspection,
//! short-circuit outcomes, and action rewriting without coupling dispatchers
//! to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Interceptor`] — trait implemented by all interceptors.
//! - [`Next`] — cursor into the remaining interceptor chain; call
//!   [`Next::run`] to forward an action to the next stage.
//! - [`InterceptorHandler`] — type-erased, cheaply-cloneable interceptor
//!   function.
//! - [`from_interceptor`] — converts an [`Interceptor`] trait object into an
//!   [`InterceptorHandler`].
//! - [`Outcome`] — what a dispatch returns to its caller.
//! - [`Dispatcher`] — owns the ordered stack and runs it per action.
//! - [`LoggerInterceptor`] — built-in pass-through action logger.

use std::sync::Arc;
use std::time::Instant;

use crate::action::Action;
use crate::cache::SharedCache;
use crate::correlate::PendingResponse;

/// What dispatching an action returns to the caller.
///
/// Most actions travel the whole pipeline and come back as
/// [`Outcome::Forwarded`]. The correlation interceptor replaces that with
/// [`Outcome::Pending`] for eligible requests, and the cache control actions
/// short-circuit with [`Outcome::Cache`] or [`Outcome::Cleared`] without
/// forwarding at all.
#[derive(Debug)]
pub enum Outcome {
    /// The action reached the end of the pipeline; this is the action as the
    /// final stage saw it.
    Forwarded(Action),
    /// A deferred settlement for a promisified request. Await it to receive
    /// the matching response.
    Pending(PendingResponse),
    /// The live cache table handle, returned by the get-cache control action.
    Cache(SharedCache),
    /// The clear-cache control action completed. Nothing else to report.
    Cleared,
}

impl Outcome {
    /// Short variant name, used for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Forwarded(_) => "forwarded",
            Outcome::Pending(_) => "pending",
            Outcome::Cache(_) => "cache",
            Outcome::Cleared => "cleared",
        }
    }

    /// Consumes the outcome, returning the forwarded action if there is one.
    pub fn into_forwarded(self) -> Option<Action> {
        match self {
            Outcome::Forwarded(action) => Some(action),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the pending settlement if there is one.
    pub fn into_pending(self) -> Option<PendingResponse> {
        match self {
            Outcome::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the cache table handle if there is one.
    pub fn into_cache(self) -> Option<SharedCache> {
        match self {
            Outcome::Cache(table) => Some(table),
            _ => None,
        }
    }
}

/// A type-erased, reference-counted interceptor function.
///
/// Every entry in the interceptor stack is stored as an
/// `InterceptorHandler`. The [`Arc`] wrapper makes handlers cheap to clone so
/// that [`Next`] can advance through the chain without copying closures.
///
/// Construct one with [`from_interceptor`] or by wrapping a closure directly:
///
/// ```
/// use std::sync::Arc;
/// use relay::action::Action;
/// use relay::pipeline::{InterceptorHandler, Next};
///
/// let handler: InterceptorHandler =
///     Arc::new(|action: Action, next: Next| next.run(action));
/// ```
pub type InterceptorHandler =
    Arc<dyn Fn(Action, Next) -> Outcome + Send + Sync + 'static>;

/// Converts an [`Interceptor`] implementation into an [`InterceptorHandler`].
pub fn from_interceptor<I>(interceptor: Arc<I>) -> InterceptorHandler
where
    I: Interceptor + 'static,
{
    Arc::new(move |action: Action, next: Next| interceptor.intercept(action, next))
}

/// A cursor into the remaining interceptor chain for a single action.
///
/// `Next` is passed to each interceptor's [`Interceptor::intercept`]
/// implementation. Calling [`Next::run`] advances the cursor by one position
/// and invokes the next interceptor (or, when the chain is exhausted, returns
/// [`Outcome::Forwarded`] with the action as it arrived at the end of the
/// pipeline).
///
/// `Next` is consumed by [`run`](Self::run), so an interceptor cannot forward
/// the same action more than once.
pub struct Next {
    interceptors: Vec<InterceptorHandler>,
    // Tracks which interceptor to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given stack.
    pub fn new(interceptors: Vec<InterceptorHandler>) -> Self {
        Self {
            interceptors,
            index: 0,
        }
    }

    /// Invokes the next interceptor in the chain and returns its outcome.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and calls it. If no handler remains, the action has reached
    /// the end of the pipeline and is handed back as [`Outcome::Forwarded`].
    pub fn run(mut self, action: Action) -> Outcome {
        if self.index < self.interceptors.len() {
            let handler = self.interceptors[self.index].clone();
            self.index += 1;
            handler(action, self)
        } else {
            Outcome::Forwarded(action)
        }
    }
}

/// The core trait for all relay interceptors.
///
/// Implementors receive an [`Action`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(action)` without modification.
/// - **Short-circuit** — return an [`Outcome`] directly without calling
///   `next` (the cache control actions do this).
/// - **Rewrite** — forward a modified copy of the action and return whatever
///   `next` produced.
///
/// # Contract
///
/// - Implementations must be `Send + Sync`: a [`Dispatcher`] may be shared
///   across tasks, and interceptor state must survive that.
/// - `intercept` processes one action to completion synchronously; it must
///   not block. Anything deferred is expressed through the returned
///   [`Outcome`] (e.g. [`Outcome::Pending`]), never by suspending inside the
///   interceptor.
/// - `next` must be called at most once per incoming action; consuming
///   [`Next`] enforces this.
pub trait Interceptor: Send + Sync {
    /// Handles the action and optionally delegates to the next stage.
    fn intercept(&self, action: Action, next: Next) -> Outcome;
}

/// Runs an ordered interceptor stack over dispatched actions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use relay::action::Action;
/// use relay::correlate::CorrelateInterceptor;
/// use relay::cache::CacheInterceptor;
/// use relay::pipeline::Dispatcher;
///
/// let dispatcher = Dispatcher::new()
///     .with(Arc::new(CorrelateInterceptor::new(false)))
///     .with(Arc::new(CacheInterceptor::new()));
///
/// let outcome = dispatcher.dispatch(Action::of("TOGGLE_SIDEBAR"));
/// assert!(outcome.into_forwarded().is_some());
/// ```
#[derive(Default)]
pub struct Dispatcher {
    interceptors: Vec<InterceptorHandler>,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor to the end of the stack.
    pub fn with<I>(mut self, interceptor: Arc<I>) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.push(from_interceptor(interceptor));
        self
    }

    /// Appends a type-erased handler to the end of the stack.
    pub fn with_handler(mut self, handler: InterceptorHandler) -> Self {
        self.interceptors.push(handler);
        self
    }

    /// Dispatches one action through the stack, front to back.
    pub fn dispatch(&self, action: Action) -> Outcome {
        Next::new(self.interceptors.clone()).run(action)
    }
}

/// Built-in interceptor that logs each action's kind, outcome, and duration.
///
/// Emits a single `tracing::debug!` line after the downstream stages
/// complete. `LoggerInterceptor` never short-circuits and never rewrites; it
/// always delegates and hands the outcome back untouched.
pub struct LoggerInterceptor;

impl Interceptor for LoggerInterceptor {
    fn intercept(&self, action: Action, next: Next) -> Outcome {
        let start = Instant::now();
        let kind = action.kind.clone();

        let outcome = next.run(action);

        tracing::debug!(
            kind = %kind,
            outcome = outcome.label(),
            elapsed = ?start.elapsed(),
            "action dispatched"
        );

        outcome
    }
}
