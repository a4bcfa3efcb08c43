//! # relay
//!
//! An interceptor pipeline for unidirectional action dispatch.
//!
//! Two built-in interceptors do the interesting work: the
//! [`CorrelateInterceptor`](correlate::CorrelateInterceptor) turns a
//! fire-and-forget request dispatch into an awaitable settled outcome, and
//! the [`CacheInterceptor`](cache::CacheInterceptor) short-circuits repeat
//! requests with the payload of an earlier cached success.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use relay::{Action, CorrelateInterceptor, Dispatcher, InterceptorHandler, Next};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Tail stage standing in for whatever executes requests.
//! let executed: Arc<Mutex<Vec<Action>>> = Arc::new(Mutex::new(Vec::new()));
//! let log = Arc::clone(&executed);
//! let executor: InterceptorHandler = Arc::new(move |action: Action, next: Next| {
//!     log.lock().unwrap().push(action.clone());
//!     next.run(action)
//! });
//!
//! let dispatcher = Dispatcher::new()
//!     .with(Arc::new(CorrelateInterceptor::new(false)))
//!     .with_handler(executor);
//!
//! // An opted-in request hands back a pending settlement...
//! let pending = dispatcher
//!     .dispatch(Action::request("FETCH_BOOKS").as_promise(true))
//!     .into_pending()
//!     .unwrap();
//!
//! // ...which fulfills when the matching success response is dispatched.
//! let seen = executed.lock().unwrap().pop().unwrap();
//! dispatcher.dispatch(seen.success_for(json!(["dune"])));
//!
//! let response = pending.await.unwrap();
//! assert_eq!(response.kind, "FETCH_BOOKS_SUCCESS");
//! # }
//! ```

pub mod action;
pub mod cache;
pub mod correlate;
pub mod pipeline;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use action::{Action, CachePolicy, Meta};
pub use cache::{CacheEntry, CacheInterceptor, Clock, SharedCache, SystemClock};
pub use correlate::{CorrelateInterceptor, PendingResponse, Rejection};
pub use pipeline::{Dispatcher, Interceptor, InterceptorHandler, Next, Outcome};
