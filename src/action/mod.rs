//! Action values and their classification.
//!
//! Everything that moves through the pipeline is an [`Action`]: a type
//! discriminator (`kind`), an optional request descriptor, an optional
//! payload, and a [`Meta`] block carrying the per-action options the
//! interceptors read.
//!
//! ## Core types
//!
//! - [`Action`] — the dispatched value.
//! - [`Meta`] — per-action options (`as_promise`, `cache`, ...).
//! - [`CachePolicy`] — "cache forever" or "cache for N seconds".
//!
//! ## Classification
//!
//! The interceptors never inspect payloads; they branch purely on the
//! classification functions defined here: [`is_request_action`],
//! [`is_success_action`], [`is_response_action`],
//! [`request_action_from_response`], [`action_payload`], and the canonical
//! type mappings [`success`] and [`error`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix appended to a request kind to form its canonical success kind.
pub const SUCCESS_SUFFIX: &str = "_SUCCESS";

/// Suffix appended to a request kind to form its canonical error kind.
pub const ERROR_SUFFIX: &str = "_ERROR";

/// Sentinel kind of the control action that returns the live cache table.
pub const GET_CACHE: &str = "relay/GET_CACHE";

/// Sentinel kind of the control action that invalidates cache entries.
pub const CLEAR_CACHE: &str = "relay/CLEAR_CACHE";

/// Maps a request kind to its canonical success kind.
///
/// # Examples
///
/// ```
/// use relay::action::success;
///
/// assert_eq!(success("FETCH_USER"), "FETCH_USER_SUCCESS");
/// ```
pub fn success(kind: &str) -> String {
    format!("{kind}{SUCCESS_SUFFIX}")
}

/// Maps a request kind to its canonical error kind.
pub fn error(kind: &str) -> String {
    format!("{kind}{ERROR_SUFFIX}")
}

/// How long a successful response payload stays cacheable.
///
/// Mirrors the `bool | seconds` shape of the `meta.cache` option on the
/// wire: `true` caches forever, `false` disables caching, a number caches
/// for that many seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachePolicy {
    /// `true` caches forever; `false` disables caching.
    Flag(bool),
    /// Cache for this many seconds from the moment of the write.
    TtlSecs(u64),
}

impl CachePolicy {
    /// Whether this policy allows a cache write at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CachePolicy::Flag(false))
    }

    /// Absolute expiry timestamp in wall-clock milliseconds, or `None` for
    /// "never expires". Saturates at `u64::MAX`, which is indistinguishable
    /// from a far future.
    pub fn expiry_millis(&self, now_millis: u64) -> Option<u64> {
        match self {
            CachePolicy::Flag(_) => None,
            CachePolicy::TtlSecs(secs) => {
                Some(now_millis.saturating_add(secs.saturating_mul(1000)))
            }
        }
    }
}

/// Per-action options read by the interceptors.
///
/// Response constructors copy the originating request's meta, so options
/// set on a request (`cache`, `cache_response`) are visible on its paired
/// response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Opts a request in to (or, under `auto`, out of) promisification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_promise: Option<bool>,

    /// Opts the paired success response in to caching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,

    /// Set by the cache interceptor on a hit; its presence on a success
    /// action suppresses re-caching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_response: Option<Value>,

    /// Opaque id stamped onto an eligible request when it is admitted to
    /// the correlation table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,

    /// The originating request action, attached to every response action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_action: Option<Box<Action>>,
}

/// A value dispatched through the pipeline.
///
/// # Examples
///
/// ```
/// use relay::action::Action;
/// use serde_json::json;
///
/// let request = Action::request("FETCH_USER").as_promise(true);
/// let response = request.success_for(json!({ "id": 7 }));
///
/// assert_eq!(response.kind, "FETCH_USER_SUCCESS");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Type discriminator.
    pub kind: String,

    /// Request descriptor — present iff this is a request action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,

    /// Response payload or control data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Per-action options.
    #[serde(default)]
    pub meta: Meta,
}

impl Action {
    /// Creates a plain action with no request marker, payload, or options.
    pub fn of(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            request: None,
            payload: None,
            meta: Meta::default(),
        }
    }

    /// Creates a request action with an empty request descriptor.
    pub fn request(kind: impl Into<String>) -> Self {
        Self {
            request: Some(Value::Null),
            ..Self::of(kind)
        }
    }

    /// Replaces the request descriptor.
    pub fn with_request(mut self, spec: Value) -> Self {
        self.request = Some(spec);
        self
    }

    /// Replaces the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets `meta.as_promise`.
    pub fn as_promise(mut self, enabled: bool) -> Self {
        self.meta.as_promise = Some(enabled);
        self
    }

    /// Sets `meta.cache`.
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.meta.cache = Some(policy);
        self
    }

    /// Shorthand for `cache(CachePolicy::Flag(true))` — never expires.
    pub fn cache_forever(self) -> Self {
        self.cache(CachePolicy::Flag(true))
    }

    /// Shorthand for `cache(CachePolicy::TtlSecs(secs))`.
    pub fn cache_for_secs(self, secs: u64) -> Self {
        self.cache(CachePolicy::TtlSecs(secs))
    }

    /// The control action that returns the live cache table.
    pub fn get_cache() -> Self {
        Self::of(GET_CACHE)
    }

    /// The control action that invalidates cache entries.
    ///
    /// An empty `kinds` list clears the entire table; otherwise only the
    /// listed request kinds are removed.
    pub fn clear_cache<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds: Vec<Value> = kinds
            .into_iter()
            .map(|k| Value::String(k.into()))
            .collect();
        Self::of(CLEAR_CACHE).with_payload(Value::Array(kinds))
    }

    /// Builds the canonical success response for this request action.
    ///
    /// The request's meta is copied onto the response (so `cache` and
    /// `cache_response` set on the request are readable on the success),
    /// and the request itself is attached as `meta.request_action`.
    pub fn success_for(&self, payload: Value) -> Action {
        self.response_for(success(&self.kind), payload)
    }

    /// Builds the canonical error response for this request action.
    pub fn error_for(&self, payload: Value) -> Action {
        self.response_for(error(&self.kind), payload)
    }

    fn response_for(&self, kind: String, payload: Value) -> Action {
        Action {
            kind,
            request: None,
            payload: Some(payload),
            meta: Meta {
                request_action: Some(Box::new(self.clone())),
                ..self.meta.clone()
            },
        }
    }
}

/// Whether this action is a request: it carries a request descriptor and is
/// not itself a response.
pub fn is_request_action(action: &Action) -> bool {
    action.request.is_some() && action.meta.request_action.is_none()
}

/// Whether this action is a response: it carries its originating request.
pub fn is_response_action(action: &Action) -> bool {
    action.meta.request_action.is_some()
}

/// Whether this action is the canonical success response of its request.
pub fn is_success_action(action: &Action) -> bool {
    match &action.meta.request_action {
        Some(request) => action.kind == success(&request.kind),
        None => false,
    }
}

/// Recovers the originating request action from a response action.
///
/// Returns `None` for actions that are not responses.
pub fn request_action_from_response(action: &Action) -> Option<&Action> {
    action.meta.request_action.as_deref()
}

/// Extracts the cacheable payload of a response action.
pub fn action_payload(action: &Action) -> Option<&Value> {
    action.payload.as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Canonical type mappings ──────────────────────────────────────────────

    #[test]
    fn success_appends_suffix() {
        assert_eq!(success("FETCH_BOOKS"), "FETCH_BOOKS_SUCCESS");
    }

    #[test]
    fn error_appends_suffix() {
        assert_eq!(error("FETCH_BOOKS"), "FETCH_BOOKS_ERROR");
    }

    // ── Classification ───────────────────────────────────────────────────────

    #[test]
    fn request_action_is_classified_as_request() {
        let action = Action::request("FETCH_BOOKS");
        assert!(is_request_action(&action));
        assert!(!is_response_action(&action));
        assert!(!is_success_action(&action));
    }

    #[test]
    fn plain_action_is_neither_request_nor_response() {
        let action = Action::of("TOGGLE_SIDEBAR");
        assert!(!is_request_action(&action));
        assert!(!is_response_action(&action));
    }

    #[test]
    fn success_response_is_classified_as_success() {
        let request = Action::request("FETCH_BOOKS");
        let response = request.success_for(json!([1, 2, 3]));
        assert!(is_response_action(&response));
        assert!(is_success_action(&response));
        assert!(!is_request_action(&response));
    }

    #[test]
    fn error_response_is_response_but_not_success() {
        let request = Action::request("FETCH_BOOKS");
        let response = request.error_for(json!("boom"));
        assert!(is_response_action(&response));
        assert!(!is_success_action(&response));
    }

    #[test]
    fn response_recovers_its_request() {
        let request = Action::request("FETCH_BOOKS").as_promise(true);
        let response = request.success_for(json!(null));
        assert_eq!(request_action_from_response(&response), Some(&request));
    }

    // ── Response construction ────────────────────────────────────────────────

    #[test]
    fn response_copies_request_meta() {
        let request = Action::request("FETCH_BOOKS").cache_for_secs(30);
        let response = request.success_for(json!([1]));
        assert_eq!(response.meta.cache, Some(CachePolicy::TtlSecs(30)));
    }

    // ── CachePolicy ──────────────────────────────────────────────────────────

    #[test]
    fn flag_true_never_expires() {
        assert_eq!(CachePolicy::Flag(true).expiry_millis(1_000), None);
        assert!(CachePolicy::Flag(true).is_enabled());
    }

    #[test]
    fn flag_false_is_disabled() {
        assert!(!CachePolicy::Flag(false).is_enabled());
    }

    #[test]
    fn ttl_expiry_is_absolute_millis() {
        assert_eq!(CachePolicy::TtlSecs(5).expiry_millis(1_000), Some(6_000));
    }

    #[test]
    fn ttl_expiry_saturates_instead_of_overflowing() {
        assert_eq!(
            CachePolicy::TtlSecs(u64::MAX).expiry_millis(5),
            Some(u64::MAX)
        );
        assert_eq!(
            CachePolicy::TtlSecs(1).expiry_millis(u64::MAX),
            Some(u64::MAX)
        );
    }

    #[test]
    fn cache_policy_deserializes_from_bool_or_number() {
        let forever: CachePolicy = serde_json::from_str("true").unwrap();
        let timed: CachePolicy = serde_json::from_str("5").unwrap();
        assert_eq!(forever, CachePolicy::Flag(true));
        assert_eq!(timed, CachePolicy::TtlSecs(5));
    }

    // ── Control actions ──────────────────────────────────────────────────────

    #[test]
    fn clear_cache_carries_kinds_in_payload() {
        let action = Action::clear_cache(["FETCH_BOOKS"]);
        assert_eq!(action.kind, CLEAR_CACHE);
        assert_eq!(action.payload, Some(json!(["FETCH_BOOKS"])));
    }
}
