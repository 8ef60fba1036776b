//! The engine: registry owner, creation path, normalization and the
//! serialization boundary.
//!
//! An [`Engine`] is built once from a code map, an ordered plugin list and
//! a handful of defaults; everything it holds is read-only afterwards, so
//! a single instance is shared freely (typically behind an `Arc`) across
//! threads. All operations run synchronously on the caller's thread - the
//! one suspension point in the crate is [`Engine::safe_future`].
//!
//! # Control Paths
//!
//! - [`Engine::create`] / [`Engine::create_with`] - the only operation
//!   with a hard failure: an unregistered code is a caller defect.
//! - [`Engine::ensure`] / [`Engine::ensure_with`] - total normalization:
//!   any input becomes a valid value, via the global unknown mapper, the
//!   plugin chain, branded-record detection, the call-site fallback code,
//!   and finally the reserved catch-all.
//! - [`Engine::safe`] / [`Engine::safe_future`] - run a fallible thunk or
//!   future; failures (including panics) come back already normalized.
//! - [`Engine::serialize`] / [`Engine::deserialize`] /
//!   [`Engine::deserialize_client`] - the boundary, which never fails.
//!
//! # Example
//!
//! ```rust
//! use relay_errors::{codes, CodeEntry, Engine};
//!
//! let engine = Engine::builder()
//!     .app("gateway")
//!     .codes(codes! {
//!         "auth" => {
//!             "invalid_token" => CodeEntry::new("Invalid token").with_status(401),
//!         },
//!     })
//!     .build();
//!
//! let err = engine.create("auth.invalid_token").unwrap();
//! let wire = engine.serialize(&err);
//! let back = engine.deserialize(&wire);
//! assert_eq!(back.status(), 401);
//! ```

use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;

use crate::codes::{CodeEntry, CodeMap, LogLevel, Registry, UnknownCode};
use crate::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};
use crate::plugin::{run_isolated, HookContext, Plugin, UnknownOutcome};
use crate::value::{ErrorValue, TagList, Unknown};
use crate::wire::{self, ClientError, SerializedRecord};
use crate::CATCH_ALL_CODE;

/// Maps a raw failure to a registered code before the plugin chain runs.
///
/// The engine-level analog of a plugin's `on_unknown`: return `Some(code)`
/// to have the failure created under that code with itself as cause.
pub type UnknownMapper = Box<dyn Fn(&Unknown) -> Option<String> + Send + Sync>;

/// Default capacity of the diagnostics ring.
const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

// ============================================================================
// Builder
// ============================================================================

/// Step-by-step construction of an [`Engine`].
///
/// Only `codes` is required in practice; every other option has the
/// documented default (status 500, expose false, retryable false, stack
/// capture on, no labels, no plugins, no mapper).
#[derive(Default)]
pub struct EngineBuilder {
    codes: CodeMap,
    plugins: Vec<Plugin>,
    app: Option<String>,
    env: Option<String>,
    default_status: Option<u16>,
    default_expose: Option<bool>,
    default_retryable: Option<bool>,
    capture_stack: Option<bool>,
    map_unknown: Option<UnknownMapper>,
    diagnostics_capacity: Option<usize>,
}

impl EngineBuilder {
    /// The registry source. Flattened and merged at `build`.
    pub fn codes(mut self, codes: CodeMap) -> Self {
        self.codes = codes;
        self
    }

    /// Append one plugin. Order of calls is pipeline order.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Append several plugins at once, preserving order.
    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Application label, stamped on every value and serialized.
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Environment label, stamped on every value, never serialized.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Status used when neither the entry nor the record pins one.
    /// Default 500.
    pub fn default_status(mut self, status: u16) -> Self {
        self.default_status = Some(status);
        self
    }

    /// Exposure used when the entry does not pin one. Default false.
    pub fn default_expose(mut self, expose: bool) -> Self {
        self.default_expose = Some(expose);
        self
    }

    /// Retry hint used when neither the entry nor the record pins one.
    /// Default false.
    pub fn default_retryable(mut self, retryable: bool) -> Self {
        self.default_retryable = Some(retryable);
        self
    }

    /// Capture a backtrace on every created value. Default true.
    pub fn capture_stack(mut self, capture: bool) -> Self {
        self.capture_stack = Some(capture);
        self
    }

    /// Install the engine-level unknown mapper, consulted before any
    /// plugin's `on_unknown`.
    pub fn map_unknown<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Unknown) -> Option<String> + Send + Sync + 'static,
    {
        self.map_unknown = Some(Box::new(mapper));
        self
    }

    /// Capacity of the diagnostics ring. Default 256.
    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = Some(capacity);
        self
    }

    /// Flatten, merge and freeze. Collision and shape warnings raised
    /// during the merge are already waiting in the engine's diagnostics
    /// channel when this returns.
    pub fn build(self) -> Engine {
        let diagnostics = DiagnosticsChannel::new(
            self.diagnostics_capacity
                .unwrap_or(DEFAULT_DIAGNOSTICS_CAPACITY),
        );
        let registry = Registry::build(&self.codes, &self.plugins, &diagnostics);

        Engine {
            registry,
            plugins: self.plugins,
            diagnostics,
            app: self.app.map(Arc::from),
            env: self.env.map(Arc::from),
            default_status: self.default_status.unwrap_or(500),
            default_expose: self.default_expose.unwrap_or(false),
            default_retryable: self.default_retryable.unwrap_or(false),
            capture_stack: self.capture_stack.unwrap_or(true),
            map_unknown: self.map_unknown,
        }
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("codes", &self.codes.len())
            .field("plugins", &self.plugins.len())
            .field("app", &self.app)
            .field("env", &self.env)
            .finish()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The assembled, immutable engine.
pub struct Engine {
    registry: Registry,
    plugins: Vec<Plugin>,
    diagnostics: DiagnosticsChannel,
    app: Option<Arc<str>>,
    env: Option<Arc<str>>,
    default_status: u16,
    default_expose: bool,
    default_retryable: bool,
    capture_stack: bool,
    map_unknown: Option<UnknownMapper>,
}

impl Engine {
    /// Start building an engine.
    #[inline]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// An engine with the given codes and every default.
    #[inline]
    pub fn new(codes: CodeMap) -> Self {
        Self::builder().codes(codes).build()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a value for a registered code with the entry's default
    /// details.
    ///
    /// # Errors
    ///
    /// [`UnknownCode`] when the id is absent from the registry - the only
    /// hard failure in the crate.
    pub fn create(&self, code: &str) -> Result<ErrorValue, UnknownCode> {
        self.create_inner(code, None, None)
    }

    /// Create a value with explicit details, overriding the entry default.
    ///
    /// # Errors
    ///
    /// [`UnknownCode`] when the id is absent from the registry.
    pub fn create_with(&self, code: &str, details: Value) -> Result<ErrorValue, UnknownCode> {
        self.create_inner(code, Some(details), None)
    }

    fn create_inner(
        &self,
        code: &str,
        details: Option<Value>,
        cause: Option<Arc<Unknown>>,
    ) -> Result<ErrorValue, UnknownCode> {
        let entry = self
            .registry
            .get(code)
            .ok_or_else(|| UnknownCode::new(code))?;
        let value = self.build_value(code, entry, details, cause);
        self.run_on_create(&value);
        Ok(value)
    }

    /// Resolve details, message and metadata per the precedence rules and
    /// assemble the immutable value.
    fn build_value(
        &self,
        code: &str,
        entry: &CodeEntry,
        details: Option<Value>,
        cause: Option<Arc<Unknown>>,
    ) -> ErrorValue {
        let details = details.or_else(|| entry.details.clone());
        let message = entry.message.resolve(details.as_ref());

        ErrorValue {
            code: Arc::from(code),
            message: Arc::from(message),
            status: entry.status.unwrap_or(self.default_status),
            expose: entry.expose.unwrap_or(self.default_expose),
            retryable: entry.retryable.unwrap_or(self.default_retryable),
            log_level: entry.log_level.unwrap_or(LogLevel::Error),
            tags: entry.tags.iter().map(|t| Arc::from(t.as_ref())).collect(),
            details,
            cause,
            app: self.app.clone(),
            env: self.env.clone(),
            backtrace: self.capture_backtrace(),
        }
    }

    fn capture_backtrace(&self) -> Option<Arc<Backtrace>> {
        self.capture_stack
            .then(|| Arc::new(Backtrace::force_capture()))
    }

    /// Every plugin's `on_create`, in order, no short-circuit. A panicking
    /// hook is recorded and the rest still fire.
    fn run_on_create(&self, value: &ErrorValue) {
        let ctx = HookContext::new(self);
        for plugin in &self.plugins {
            if let Some(hook) = &plugin.on_create {
                run_isolated(
                    &self.diagnostics,
                    DiagnosticOrigin::plugin(plugin.name(), "on_create"),
                    || hook(value, &ctx),
                );
            }
        }
    }

    /// The reserved catch-all value: a fresh instance per occurrence,
    /// never exposed, carrying the raw input as opaque detail and cause.
    fn catch_all(&self, raw: Unknown) -> ErrorValue {
        let detail = raw.to_detail();
        let value = ErrorValue {
            code: Arc::from(CATCH_ALL_CODE),
            message: Arc::from("Unhandled internal failure"),
            status: self.default_status,
            expose: false,
            retryable: self.default_retryable,
            log_level: LogLevel::Error,
            tags: TagList::new(),
            details: Some(detail),
            cause: Some(Arc::new(raw)),
            app: self.app.clone(),
            env: self.env.clone(),
            backtrace: self.capture_backtrace(),
        };
        self.run_on_create(&value);
        value
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Normalize any input into a valid value. Total: never panics, never
    /// fails, for any input.
    ///
    /// Already-normalized values pass through untouched - identity, no
    /// copy, no hook re-run.
    pub fn ensure(&self, raw: impl Into<Unknown>) -> ErrorValue {
        self.normalize(raw.into(), None)
    }

    /// [`Engine::ensure`] with a call-site fallback code, consulted after
    /// the plugin chain but before the reserved catch-all.
    pub fn ensure_with(&self, raw: impl Into<Unknown>, fallback_code: &str) -> ErrorValue {
        self.normalize(raw.into(), Some(fallback_code))
    }

    fn normalize(&self, raw: Unknown, fallback_code: Option<&str>) -> ErrorValue {
        // Identity for recognized values.
        let raw = match raw {
            Unknown::Value(value) => return value,
            other => other,
        };

        // (a) The engine-level mapper, isolated like any hook.
        if let Some(mapper) = &self.map_unknown {
            let mapped =
                run_isolated(&self.diagnostics, DiagnosticOrigin::Engine, || mapper(&raw))
                    .flatten();
            if let Some(code) = mapped {
                match self.create_for_raw(&code, None, raw) {
                    Ok(value) => return value,
                    Err(returned) => {
                        self.diagnostics.warn(
                            DiagnosticOrigin::Engine,
                            format!("unknown mapper named unregistered code `{code}`"),
                        );
                        return self.normalize_after_mapper(returned, fallback_code);
                    }
                }
            }
        }

        self.normalize_after_mapper(raw, fallback_code)
    }

    fn normalize_after_mapper(&self, raw: Unknown, fallback_code: Option<&str>) -> ErrorValue {
        // (b) Plugin chain: first non-pass outcome wins.
        let mut raw = raw;
        let ctx = HookContext::new(self);
        for plugin in &self.plugins {
            let Some(hook) = &plugin.on_unknown else {
                continue;
            };
            let outcome = run_isolated(
                &self.diagnostics,
                DiagnosticOrigin::plugin(plugin.name(), "on_unknown"),
                || hook(&raw, &ctx),
            )
            .flatten();
            match outcome {
                Some(UnknownOutcome::Value(value)) => return value,
                Some(UnknownOutcome::Mapped { code, details }) => {
                    match self.create_for_raw(&code, details, raw) {
                        Ok(value) => return value,
                        Err(returned) => {
                            self.diagnostics.warn(
                                DiagnosticOrigin::plugin(plugin.name(), "on_unknown"),
                                format!("mapped to unregistered code `{code}`"),
                            );
                            raw = returned;
                        }
                    }
                }
                None => {}
            }
        }

        // (c) A branded record that crossed back to us.
        if let Unknown::Json(value) = &raw {
            if let Some(record) = SerializedRecord::from_value(value) {
                return self.deserialize(&record);
            }
        }

        // (d) The call-site fallback code.
        if let Some(code) = fallback_code {
            match self.create_for_raw(code, None, raw) {
                Ok(value) => return value,
                Err(returned) => {
                    self.diagnostics.warn(
                        DiagnosticOrigin::Engine,
                        format!("fallback code `{code}` is not registered"),
                    );
                    return self.catch_all(returned);
                }
            }
        }

        // (e) The reserved catch-all.
        self.catch_all(raw)
    }

    /// Create `code` with `raw` as cause; hand `raw` back untouched when
    /// the code is unregistered so the caller can keep normalizing.
    fn create_for_raw(
        &self,
        code: &str,
        details: Option<Value>,
        raw: Unknown,
    ) -> Result<ErrorValue, Unknown> {
        if !self.registry.contains(code) {
            return Err(raw);
        }
        let cause = Some(Arc::new(raw));
        // Lookup can no longer fail; keep the fault path anyway.
        self.create_inner(code, details, cause)
            .map_err(|_| Unknown::Text(format!("unregistered code {code}")))
    }

    /// Run a fallible thunk; any failure - an `Err` or a panic - comes
    /// back normalized. The sync half of the `safe` pair.
    ///
    /// ```rust
    /// # use relay_errors::{codes, CodeEntry, Engine};
    /// # let engine = Engine::new(codes! {
    /// #     "io" => { "failed" => CodeEntry::new("IO failed") },
    /// # });
    /// let result: Result<u32, _> = engine.safe(|| {
    ///     Err(std::io::Error::other("disk gone"))
    /// });
    /// assert!(result.unwrap_err().is_catch_all());
    /// ```
    pub fn safe<T, E, F>(&self, thunk: F) -> Result<T, ErrorValue>
    where
        E: Into<Unknown>,
        F: FnOnce() -> Result<T, E>,
    {
        match catch_unwind(AssertUnwindSafe(thunk)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(self.ensure(failure)),
            Err(payload) => Err(self.ensure(Unknown::from_panic(payload))),
        }
    }

    /// Await a fallible future; failures and panics come back normalized.
    /// The only suspension point in the crate - a pure await-and-catch
    /// wrapper with no cancellation and no timeout.
    pub async fn safe_future<T, E, F>(&self, future: F) -> Result<T, ErrorValue>
    where
        E: Into<Unknown>,
        F: Future<Output = Result<T, E>>,
    {
        match (CatchUnwindFuture { inner: future }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(self.ensure(failure)),
            Err(payload) => Err(self.ensure(Unknown::from_panic(payload))),
        }
    }

    // ------------------------------------------------------------------
    // Serialization boundary
    // ------------------------------------------------------------------

    /// Project a value to its wire record and run the `on_serialize`
    /// chain. Exposure is enforced before the first hook sees the record;
    /// a panicking hook keeps its pre-hook payload.
    pub fn serialize(&self, value: &ErrorValue) -> SerializedRecord {
        let mut record = wire::project(value);
        let ctx = HookContext::new(self);

        for plugin in &self.plugins {
            let Some(hook) = &plugin.on_serialize else {
                continue;
            };
            let before = record.clone();
            record = run_isolated(
                &self.diagnostics,
                DiagnosticOrigin::plugin(plugin.name(), "on_serialize"),
                || hook(record, value, &ctx),
            )
            .unwrap_or(before);
        }

        record
    }

    /// Reconstruct a full value from a wire record. Never fails: missing
    /// fields default safely, unrecognized codes reconstruct best-effort,
    /// and a forged catch-all record is hardened.
    pub fn deserialize(&self, record: &SerializedRecord) -> ErrorValue {
        wire::reconstruct(record, self.registry.get(&record.code), self)
    }

    /// Brand-check a JSON value and reconstruct it. `None` when the value
    /// does not carry the exact brand.
    pub fn deserialize_value(&self, value: &Value) -> Option<ErrorValue> {
        SerializedRecord::from_value(value).map(|record| self.deserialize(&record))
    }

    /// Reconstruct the lighter client mirror, giving plugins'
    /// `on_deserialize` the first word (first `Some` wins).
    pub fn deserialize_client(&self, record: &SerializedRecord) -> ClientError {
        let ctx = HookContext::new(self);
        for plugin in &self.plugins {
            let Some(hook) = &plugin.on_deserialize else {
                continue;
            };
            let mirrored = run_isolated(
                &self.diagnostics,
                DiagnosticOrigin::plugin(plugin.name(), "on_deserialize"),
                || hook(record, &ctx),
            )
            .flatten();
            if let Some(client) = mirrored {
                return client;
            }
        }
        ClientError::from_record(record)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The frozen registry.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The diagnostics channel (shared; clone it to watch from elsewhere).
    #[inline]
    pub fn diagnostics(&self) -> &DiagnosticsChannel {
        &self.diagnostics
    }

    /// The configured application label.
    #[inline]
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// The configured environment label.
    #[inline]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// The configured default status.
    #[inline]
    pub fn default_status(&self) -> u16 {
        self.default_status
    }

    /// The configured default exposure flag.
    #[inline]
    pub fn default_expose(&self) -> bool {
        self.default_expose
    }

    /// The configured default retry flag.
    #[inline]
    pub fn default_retryable(&self) -> bool {
        self.default_retryable
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("codes", &self.registry.len())
            .field("plugins", &self.plugins.len())
            .field("app", &self.app)
            .field("env", &self.env)
            .field("default_status", &self.default_status)
            .finish()
    }
}

// ============================================================================
// Panic-Catching Future
// ============================================================================

/// Wraps a future so a panic inside `poll` resolves the future instead of
/// unwinding through the executor.
struct CatchUnwindFuture<F> {
    inner: F,
}

impl<F: Future> Future for CatchUnwindFuture<F> {
    type Output = Result<F::Output, Box<dyn std::any::Any + Send>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is structurally pinned - it is never moved out
        // of `self` and no `Unpin` access is exposed.
        let inner = unsafe { self.map_unchecked_mut(|s| &mut s.inner) };
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;
    use crate::codes::CodeEntry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> Engine {
        Engine::builder()
            .app("gateway")
            .env("test")
            .capture_stack(false)
            .codes(codes! {
                "auth" => {
                    "invalid_token" => CodeEntry::new("Invalid token")
                        .with_status(401)
                        .with_tag("auth"),
                    "rate_limited" => CodeEntry::new("Too many attempts")
                        .with_status(429)
                        .with_retryable(true),
                },
                "billing" => {
                    "retry_later" => CodeEntry::templated("Retry after {retryAfter}s")
                        .with_details(json!({"retryAfter": 45}))
                        .with_retryable(true),
                },
            })
            .build()
    }

    #[test]
    fn create_resolves_entry_metadata() {
        let err = engine()
            .create_with("auth.invalid_token", json!({"reason": "expired"}))
            .unwrap();

        assert_eq!(err.code(), "auth.invalid_token");
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), "Invalid token");
        assert!(!err.is_retryable());
        assert!(err.has_tag("auth"));
        assert_eq!(err.details(), Some(&json!({"reason": "expired"})));
        assert_eq!(err.app(), Some("gateway"));
        assert_eq!(err.env(), Some("test"));
    }

    #[test]
    fn create_rejects_unregistered_codes() {
        let fault = engine().create("auth.nope").unwrap_err();
        assert_eq!(fault.code(), "auth.nope");
    }

    #[test]
    fn template_uses_default_then_explicit_details() {
        let engine = engine();

        let defaulted = engine.create("billing.retry_later").unwrap();
        assert_eq!(defaulted.message(), "Retry after 45s");

        let explicit = engine
            .create_with("billing.retry_later", json!({"retryAfter": 10}))
            .unwrap();
        assert_eq!(explicit.message(), "Retry after 10s");
    }

    #[test]
    fn instance_defaults_fill_unset_entry_fields() {
        let engine = Engine::builder()
            .default_status(502)
            .default_retryable(true)
            .capture_stack(false)
            .codes(codes! { "bare" => CodeEntry::new("Bare") })
            .build();

        let err = engine.create("bare").unwrap();
        assert_eq!(err.status(), 502);
        assert!(err.is_retryable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn capture_stack_toggle_controls_backtrace() {
        let with = Engine::builder()
            .codes(codes! { "c" => CodeEntry::new("m") })
            .build();
        assert!(with.create("c").unwrap().backtrace().is_some());

        let without = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .build();
        assert!(without.create("c").unwrap().backtrace().is_none());
    }

    #[test]
    fn ensure_is_identity_for_normalized_values() {
        let engine = engine();
        let original = engine.create("auth.invalid_token").unwrap();
        let message_ptr = original.message().as_ptr();

        let ensured = engine.ensure(original);
        assert_eq!(ensured.message().as_ptr(), message_ptr);
    }

    #[test]
    fn ensure_falls_back_to_catch_all() {
        let err = engine().ensure("something odd");
        assert!(err.is_catch_all());
        assert!(!err.is_exposed());
        assert_eq!(err.details(), Some(&json!("something odd")));
        assert!(err.cause().is_some());
    }

    #[test]
    fn catch_all_instances_are_fresh_per_occurrence() {
        let engine = engine();
        let a = engine.ensure("first");
        let b = engine.ensure("second");
        assert!(a.is_catch_all() && b.is_catch_all());
        assert_ne!(a.details(), b.details());
    }

    #[test]
    fn ensure_with_uses_registered_fallback() {
        let err = engine().ensure_with("kaboom", "auth.rate_limited");
        assert_eq!(err.code(), "auth.rate_limited");
        assert_eq!(err.cause().map(|c| c.render()), Some("kaboom".to_owned()));
    }

    #[test]
    fn unregistered_fallback_degrades_to_catch_all() {
        let engine = engine();
        let err = engine.ensure_with("kaboom", "not.a.code");
        assert!(err.is_catch_all());
        assert!(engine
            .diagnostics()
            .all()
            .iter()
            .any(|d| d.message.contains("not.a.code")));
    }

    #[test]
    fn global_mapper_runs_before_plugins() {
        let plugin_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&plugin_hits);

        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "mapped" => CodeEntry::new("Mapped") })
            .map_unknown(|_| Some("mapped".to_owned()))
            .plugin(Plugin::new("late").on_unknown(move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                None
            }))
            .build();

        let err = engine.ensure("raw");
        assert_eq!(err.code(), "mapped");
        assert_eq!(plugin_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mapper_naming_unregistered_code_degrades_gracefully() {
        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .map_unknown(|_| Some("ghost.code".to_owned()))
            .build();

        let err = engine.ensure("raw");
        assert!(err.is_catch_all());
        assert!(engine
            .diagnostics()
            .all()
            .iter()
            .any(|d| d.message.contains("ghost.code")));
    }

    #[test]
    fn first_plugin_outcome_wins_and_stops_chain() {
        let later_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&later_hits);

        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "io" => { "failed" => CodeEntry::new("IO failed") } })
            .plugin(
                Plugin::new("first")
                    .on_unknown(|_, _| Some(UnknownOutcome::mapped("io.failed"))),
            )
            .plugin(Plugin::new("second").on_unknown(move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                None
            }))
            .build();

        let err = engine.ensure("refused");
        assert_eq!(err.code(), "io.failed");
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_on_unknown_is_pass_through() {
        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "io" => { "failed" => CodeEntry::new("IO failed") } })
            .plugin(Plugin::new("broken").on_unknown(|_, _| panic!("hook bug")))
            .plugin(
                Plugin::new("healthy")
                    .on_unknown(|_, _| Some(UnknownOutcome::mapped("io.failed"))),
            )
            .build();

        let err = engine.ensure("raw");
        assert_eq!(err.code(), "io.failed");
        assert_eq!(engine.diagnostics().len(), 1);
    }

    #[test]
    fn panicking_on_create_does_not_block_creation_or_later_hooks() {
        let healthy_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&healthy_hits);

        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .plugin(Plugin::new("broken").on_create(|_, _| panic!("observer bug")))
            .plugin(Plugin::new("healthy").on_create(move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
            .build();

        let err = engine.create("c").unwrap();
        assert_eq!(err.code(), "c");
        assert_eq!(healthy_hits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.diagnostics().len(), 1);
    }

    #[test]
    fn on_create_fires_for_every_creation_path() {
        let births = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&births);

        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .plugin(Plugin::new("census").on_create(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .build();

        let _ = engine.create("c").unwrap();
        let _ = engine.ensure("raw"); // catch-all construction
        assert_eq!(births.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ensure_deserializes_branded_json() {
        let engine = engine();
        let original = engine.create("auth.invalid_token").unwrap();
        let wire = serde_json::to_value(engine.serialize(&original)).unwrap();

        let back = engine.ensure(wire);
        assert_eq!(back.code(), "auth.invalid_token");
        assert_eq!(back.status(), 401);
    }

    #[test]
    fn unbranded_json_is_not_mistaken_for_a_record() {
        let err = engine().ensure(json!({"code": "auth.invalid_token", "message": "forged"}));
        assert!(err.is_catch_all());
    }

    #[test]
    fn safe_passes_success_through() {
        let value = engine().safe(|| Ok::<_, Unknown>(21)).unwrap();
        assert_eq!(value, 21);
    }

    #[test]
    fn safe_normalizes_errors_and_panics() {
        let engine = engine();

        let err = engine
            .safe(|| Err::<(), _>(std::io::Error::other("disk gone")))
            .unwrap_err();
        assert!(err.is_catch_all());
        assert_eq!(err.details(), Some(&json!("disk gone")));

        let err = engine
            .safe(|| -> Result<(), Unknown> { panic!("thunk bug") })
            .unwrap_err();
        assert!(err.is_catch_all());
        assert_eq!(err.details(), Some(&json!("thunk bug")));
    }

    #[test]
    fn hook_context_exposes_config_snapshot() {
        let engine = Engine::builder()
            .app("gateway")
            .env("staging")
            .default_status(418)
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .plugin(Plugin::new("probe").on_create(|_, ctx| {
                assert_eq!(ctx.app(), Some("gateway"));
                assert_eq!(ctx.env(), Some("staging"));
                assert_eq!(ctx.default_status(), 418);
                assert!(!ctx.default_expose());
            }))
            .build();

        let _ = engine.create("c").unwrap();
    }

    #[test]
    fn hook_context_can_create_sibling_values() {
        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! {
                "io" => { "failed" => CodeEntry::new("IO failed").with_status(503) },
            })
            .plugin(Plugin::new("mapper").on_unknown(|raw, ctx| {
                raw.render()
                    .contains("refused")
                    .then(|| UnknownOutcome::Value(ctx.create("io.failed").unwrap()))
            }))
            .build();

        let err = engine.ensure("connection refused");
        assert_eq!(err.code(), "io.failed");
        assert_eq!(err.status(), 503);
    }

    #[tokio::test]
    async fn safe_future_awaits_and_normalizes() {
        let engine = engine();

        let ok = engine
            .safe_future(async { Ok::<_, Unknown>("done") })
            .await
            .unwrap();
        assert_eq!(ok, "done");

        let err = engine
            .safe_future(async { Err::<(), _>(std::io::Error::other("net down")) })
            .await
            .unwrap_err();
        assert!(err.is_catch_all());

        async fn explode() -> Result<(), Unknown> {
            panic!("async bug")
        }
        let err = engine.safe_future(explode()).await.unwrap_err();
        assert!(err.is_catch_all());
        assert_eq!(err.details(), Some(&json!("async bug")));
    }
}
