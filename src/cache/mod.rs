//! TTL response cache — serve repeat requests from cached payloads.
//!
//! The [`CacheInterceptor`] owns a table keyed by request *kind* (not action
//! identity, so repeat requests of the same kind share one slot). A
//! qualifying success action writes its payload into the table together with
//! an absolute expiry timestamp; a later request of the same kind whose entry
//! is still valid is forwarded with `meta.cache_response` set to the cached
//! payload, so the executing stage can skip the real request.
//!
//! Expiry is lazy: an expired entry is ignored at read time but never swept.
//! Invalidation is explicit, through two control actions (see
//! [`Action::get_cache`] and [`Action::clear_cache`]) that the interceptor
//! answers itself without forwarding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::action::{self, Action, CLEAR_CACHE, GET_CACHE};
use crate::pipeline::{Interceptor, Next, Outcome};

/// One cached response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The payload served on a hit.
    pub response: Value,
    /// Absolute expiry in wall-clock milliseconds; `None` never expires.
    pub expiring: Option<u64>,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now_millis`.
    pub fn is_valid(&self, now_millis: u64) -> bool {
        match self.expiring {
            None => true,
            Some(expiring) => now_millis <= expiring,
        }
    }
}

/// The live cache table, shared between the interceptor and whoever asked
/// for it via the get-cache control action.
pub type SharedCache = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Wall-clock source, injected so expiry is testable.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The default [`Clock`], backed by [`SystemTime`].
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// The TTL response cache interceptor.
pub struct CacheInterceptor {
    table: SharedCache,
    clock: Arc<dyn Clock>,
}

impl Default for CacheInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheInterceptor {
    /// Creates the interceptor with an empty table and the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates the interceptor with an explicit [`Clock`].
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Handle to the live cache table.
    pub fn table(&self) -> SharedCache {
        Arc::clone(&self.table)
    }
}

impl Interceptor for CacheInterceptor {
    fn intercept(&self, mut action: Action, next: Next) -> Outcome {
        // Control actions are answered here and never forwarded.
        if action.kind == GET_CACHE {
            return Outcome::Cache(self.table());
        }

        if action.kind == CLEAR_CACHE {
            let kinds = clear_targets(&action);
            let mut table = lock(&self.table);
            if kinds.is_empty() {
                debug!("clearing entire response cache");
                table.clear();
            } else {
                debug!(count = kinds.len(), "invalidating cached response kinds");
                for kind in &kinds {
                    table.remove(kind);
                }
            }
            return Outcome::Cleared;
        }

        if action::is_request_action(&action) {
            let now = self.clock.now_millis();
            let cached = lock(&self.table)
                .get(&action.kind)
                .filter(|entry| entry.is_valid(now))
                .map(|entry| entry.response.clone());

            if let Some(response) = cached {
                trace!(kind = %action.kind, "cache hit");
                action.meta.cache_response = Some(response);
                return next.run(action);
            }
        }

        if action::is_success_action(&action)
            && action.meta.cache.is_some_and(|policy| policy.is_enabled())
            && action.meta.cache_response.is_none()
        {
            let payload = action::action_payload(&action).cloned();
            let request = action::request_action_from_response(&action);
            if let (Some(request), Some(payload), Some(policy)) =
                (request, payload, action.meta.cache)
            {
                let entry = CacheEntry {
                    response: payload,
                    expiring: policy.expiry_millis(self.clock.now_millis()),
                };
                trace!(kind = %request.kind, expiring = ?entry.expiring, "caching response");
                lock(&self.table).insert(request.kind.clone(), entry);
            }
        }

        next.run(action)
    }
}

/// Request kinds named by a clear-cache control action. Empty means "clear
/// everything".
fn clear_targets(action: &Action) -> Vec<String> {
    match &action.payload {
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(|kind| kind.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

// No code panics while holding the table lock, so a poisoned lock still
// guards a consistent table.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Dispatcher, InterceptorHandler};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(millis: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(millis)))
        }

        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Dispatcher with the cache interceptor followed by a tap recording
    /// every forwarded action.
    fn rig(clock: Arc<ManualClock>) -> (Dispatcher, SharedCache, Arc<Mutex<Vec<Action>>>) {
        let interceptor = Arc::new(CacheInterceptor::with_clock(clock));
        let table = interceptor.table();
        let seen: Arc<Mutex<Vec<Action>>> = Arc::new(Mutex::new(Vec::new()));

        let tap_log = Arc::clone(&seen);
        let tap: InterceptorHandler = Arc::new(move |action: Action, next: Next| {
            tap_log.lock().unwrap().push(action.clone());
            next.run(action)
        });

        let dispatcher = Dispatcher::new().with(interceptor).with_handler(tap);
        (dispatcher, table, seen)
    }

    fn last_forwarded(seen: &Mutex<Vec<Action>>) -> Action {
        seen.lock().unwrap().last().cloned().unwrap()
    }

    fn fill(dispatcher: &Dispatcher, request: &Action, payload: Value) {
        dispatcher.dispatch(request.success_for(payload));
    }

    // ── Hits and misses ──────────────────────────────────────────────────────

    #[test]
    fn cached_success_serves_later_requests_of_the_same_kind() {
        let (dispatcher, _, seen) = rig(ManualClock::at(0));
        let request = Action::request("FETCH_BOOKS").cache_forever();

        fill(&dispatcher, &request, json!([1, 2, 3]));
        dispatcher.dispatch(Action::request("FETCH_BOOKS"));

        let hit = last_forwarded(&seen);
        assert_eq!(hit.meta.cache_response, Some(json!([1, 2, 3])));
    }

    #[test]
    fn forever_entries_outlive_any_clock() {
        let clock = ManualClock::at(0);
        let (dispatcher, _, seen) = rig(Arc::clone(&clock));
        let request = Action::request("FETCH_BOOKS").cache_forever();

        fill(&dispatcher, &request, json!(1));
        clock.set(u64::MAX);
        dispatcher.dispatch(Action::request("FETCH_BOOKS"));

        assert!(last_forwarded(&seen).meta.cache_response.is_some());
    }

    #[test]
    fn timed_entry_hits_before_expiry_and_misses_after() {
        let clock = ManualClock::at(1_000);
        let (dispatcher, table, seen) = rig(Arc::clone(&clock));
        let request = Action::request("FETCH_BOOKS").cache_for_secs(5);

        fill(&dispatcher, &request, json!(1));

        clock.set(1_000 + 4_999);
        dispatcher.dispatch(Action::request("FETCH_BOOKS"));
        assert!(last_forwarded(&seen).meta.cache_response.is_some());

        clock.set(1_000 + 5_001);
        dispatcher.dispatch(Action::request("FETCH_BOOKS"));
        assert!(last_forwarded(&seen).meta.cache_response.is_none());

        // Lazy expiry: the stale entry stays in the table.
        assert_eq!(lock(&table).len(), 1);
    }

    #[test]
    fn miss_forwards_the_request_unmodified() {
        let (dispatcher, _, seen) = rig(ManualClock::at(0));
        let request = Action::request("FETCH_BOOKS").as_promise(true);

        dispatcher.dispatch(request.clone());
        assert_eq!(last_forwarded(&seen), request);
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    #[test]
    fn success_without_cache_option_is_not_written() {
        let (dispatcher, table, _) = rig(ManualClock::at(0));
        fill(&dispatcher, &Action::request("FETCH_BOOKS"), json!(1));
        assert!(lock(&table).is_empty());
    }

    #[test]
    fn cache_false_is_not_written() {
        let (dispatcher, table, _) = rig(ManualClock::at(0));
        let request =
            Action::request("FETCH_BOOKS").cache(crate::action::CachePolicy::Flag(false));
        fill(&dispatcher, &request, json!(1));
        assert!(lock(&table).is_empty());
    }

    #[test]
    fn cache_served_success_is_not_recached() {
        let (dispatcher, table, seen) = rig(ManualClock::at(0));
        let request = Action::request("FETCH_BOOKS").cache_forever();

        fill(&dispatcher, &request, json!("fresh"));

        // Re-dispatch the request; the hit stamps `cache_response` onto it,
        // and the success built from the served copy carries that mark.
        dispatcher.dispatch(Action::request("FETCH_BOOKS").cache_forever());
        let served = last_forwarded(&seen);
        fill(&dispatcher, &served, json!("served"));

        assert_eq!(
            lock(&table).get("FETCH_BOOKS").unwrap().response,
            json!("fresh")
        );
    }

    #[test]
    fn overwrite_replaces_payload_and_expiry() {
        let clock = ManualClock::at(0);
        let (dispatcher, table, _) = rig(Arc::clone(&clock));

        fill(
            &dispatcher,
            &Action::request("FETCH_BOOKS").cache_for_secs(5),
            json!(1),
        );
        clock.set(10_000);
        fill(
            &dispatcher,
            &Action::request("FETCH_BOOKS").cache_for_secs(5),
            json!(2),
        );

        let entry = lock(&table).get("FETCH_BOOKS").cloned().unwrap();
        assert_eq!(entry.response, json!(2));
        assert_eq!(entry.expiring, Some(15_000));
    }

    // ── Control actions ──────────────────────────────────────────────────────

    #[test]
    fn get_cache_returns_the_live_table_without_forwarding() {
        let (dispatcher, _, seen) = rig(ManualClock::at(0));

        let handle = dispatcher
            .dispatch(Action::get_cache())
            .into_cache()
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());

        // Live, not a snapshot: writes made after the handle was taken are
        // visible through it.
        fill(
            &dispatcher,
            &Action::request("FETCH_BOOKS").cache_forever(),
            json!(1),
        );
        assert_eq!(lock(&handle).len(), 1);
    }

    #[test]
    fn clear_cache_with_no_kinds_empties_the_table() {
        let (dispatcher, table, seen) = rig(ManualClock::at(0));
        fill(
            &dispatcher,
            &Action::request("FETCH_BOOKS").cache_forever(),
            json!(1),
        );
        fill(
            &dispatcher,
            &Action::request("FETCH_AUTHORS").cache_forever(),
            json!(2),
        );
        seen.lock().unwrap().clear();

        let outcome = dispatcher.dispatch(Action::clear_cache(Vec::<String>::new()));
        assert!(matches!(outcome, Outcome::Cleared));
        assert!(lock(&table).is_empty());
        // Control actions are not forwarded.
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_cache_with_kinds_removes_only_those() {
        let (dispatcher, table, _) = rig(ManualClock::at(0));
        fill(
            &dispatcher,
            &Action::request("FETCH_BOOKS").cache_forever(),
            json!(1),
        );
        fill(
            &dispatcher,
            &Action::request("FETCH_AUTHORS").cache_forever(),
            json!(2),
        );

        dispatcher.dispatch(Action::clear_cache(["FETCH_BOOKS"]));

        let table = lock(&table);
        assert!(!table.contains_key("FETCH_BOOKS"));
        assert!(table.contains_key("FETCH_AUTHORS"));
    }

    // ── Pass-through ─────────────────────────────────────────────────────────

    #[test]
    fn unrelated_actions_pass_through_untouched() {
        let (dispatcher, table, seen) = rig(ManualClock::at(0));
        let action = Action::of("TOGGLE_SIDEBAR").with_payload(json!(true));

        let outcome = dispatcher.dispatch(action.clone());
        assert_eq!(outcome.into_forwarded().unwrap(), action);
        assert_eq!(last_forwarded(&seen), action);
        assert!(lock(&table).is_empty());
    }
}
