//! The ordered plugin pipeline.
//!
//! A plugin is a capability record, not a trait object: a name, an optional
//! contributed code map, and four optional lifecycle hooks. The engine
//! iterates its plugin list in declaration order and skips absent hooks -
//! there is no virtual dispatch and no registration after construction.
//!
//! # Hook Semantics
//!
//! - `on_unknown` - tried per plugin in order; the first hook returning
//!   `Some` wins and stops the chain. It may hand back a fully formed
//!   value or name a `{code, details}` pair to be created with the raw
//!   input as cause.
//! - `on_create` - runs for every plugin, in order, unconditionally; pure
//!   side effects (metrics, tracing), no short-circuit.
//! - `on_serialize` - chained: each plugin receives the previous plugin's
//!   output record and returns the next.
//! - `on_deserialize` - the client-side mirror of `on_unknown`: first
//!   `Some` wins, producing the lighter [`ClientError`].
//!
//! # Fault Isolation
//!
//! A panicking hook never aborts the primary operation and never blocks
//! later hooks. The panic is caught, recorded to the diagnostics channel,
//! and the hook is treated as having contributed nothing (for the chained
//! `on_serialize`, the pre-hook record is kept).
//!
//! # Re-entrancy
//!
//! The [`HookContext`] handed to every hook exposes `create` and `ensure`
//! on the owning engine. A hook that calls `ensure` on the very value it
//! was handed can recurse; that is a documented caller responsibility, not
//! an enforced guard.
//!
//! # Example
//!
//! ```rust
//! use relay_errors::{codes, CodeEntry, Plugin, UnknownOutcome};
//!
//! let plugin = Plugin::new("io-mapper")
//!     .with_codes(codes! {
//!         "io" => {
//!             "unavailable" => CodeEntry::new("Backend unavailable")
//!                 .with_status(503)
//!                 .with_retryable(true),
//!         },
//!     })
//!     .on_unknown(|raw, _ctx| {
//!         raw.render()
//!             .contains("connection refused")
//!             .then(|| UnknownOutcome::mapped("io.unavailable"))
//!     });
//! # let _ = plugin;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use crate::codes::{CodeMap, UnknownCode};
use crate::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};
use crate::engine::Engine;
use crate::value::{panic_message, ErrorValue, Unknown};
use crate::wire::{ClientError, SerializedRecord};

// ============================================================================
// Hook Signatures
// ============================================================================

/// Maps an unrecognized failure, or passes (`None`).
pub type OnUnknownFn =
    dyn Fn(&Unknown, &HookContext<'_>) -> Option<UnknownOutcome> + Send + Sync;

/// Observes a freshly created value. Side effects only.
pub type OnCreateFn = dyn Fn(&ErrorValue, &HookContext<'_>) + Send + Sync;

/// Adapts the outgoing wire record.
pub type OnSerializeFn =
    dyn Fn(SerializedRecord, &ErrorValue, &HookContext<'_>) -> SerializedRecord + Send + Sync;

/// Reconstructs a client-side mirror, or passes (`None`).
pub type OnDeserializeFn =
    dyn Fn(&SerializedRecord, &HookContext<'_>) -> Option<ClientError> + Send + Sync;

// ============================================================================
// Unknown-Mapping Outcome
// ============================================================================

/// What an `on_unknown` hook hands back when it claims a raw failure.
#[derive(Debug)]
pub enum UnknownOutcome {
    /// Name a registered code to create, with optional explicit details.
    /// The raw input becomes the created value's cause. Naming an
    /// unregistered code is recorded as a diagnostic and treated as a
    /// pass - normalization stays total.
    Mapped {
        /// The dot-qualified id to create.
        code: String,
        /// Details for the created value; falls back to the entry default.
        details: Option<Value>,
    },
    /// Hand back a fully formed value as-is.
    Value(ErrorValue),
}

impl UnknownOutcome {
    /// Map to a registered code with the entry's default details.
    #[inline]
    pub fn mapped(code: impl Into<String>) -> Self {
        Self::Mapped {
            code: code.into(),
            details: None,
        }
    }

    /// Map to a registered code with explicit details.
    #[inline]
    pub fn mapped_with(code: impl Into<String>, details: Value) -> Self {
        Self::Mapped {
            code: code.into(),
            details: Some(details),
        }
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// An ordered extension: contributed codes plus optional lifecycle hooks.
///
/// Names are advisory-unique - a repeated name is a diagnostic warning at
/// registry construction, not an error.
pub struct Plugin {
    pub(crate) name: Cow<'static, str>,
    pub(crate) codes: CodeMap,
    pub(crate) on_unknown: Option<Box<OnUnknownFn>>,
    pub(crate) on_create: Option<Box<OnCreateFn>>,
    pub(crate) on_serialize: Option<Box<OnSerializeFn>>,
    pub(crate) on_deserialize: Option<Box<OnDeserializeFn>>,
}

impl Plugin {
    /// A plugin with no codes and no hooks. Build it up from here.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            codes: CodeMap::new(),
            on_unknown: None,
            on_create: None,
            on_serialize: None,
            on_deserialize: None,
        }
    }

    /// Contribute a code map, merged on top of the user codes at engine
    /// construction (declaration order, last write wins, warned).
    pub fn with_codes(mut self, codes: CodeMap) -> Self {
        self.codes = codes;
        self
    }

    /// Install the unknown-failure mapper.
    pub fn on_unknown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Unknown, &HookContext<'_>) -> Option<UnknownOutcome> + Send + Sync + 'static,
    {
        self.on_unknown = Some(Box::new(hook));
        self
    }

    /// Install the creation observer.
    pub fn on_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ErrorValue, &HookContext<'_>) + Send + Sync + 'static,
    {
        self.on_create = Some(Box::new(hook));
        self
    }

    /// Install the wire-record adapter.
    pub fn on_serialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(SerializedRecord, &ErrorValue, &HookContext<'_>) -> SerializedRecord
            + Send
            + Sync
            + 'static,
    {
        self.on_serialize = Some(Box::new(hook));
        self
    }

    /// Install the client-mirror reconstructor.
    pub fn on_deserialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SerializedRecord, &HookContext<'_>) -> Option<ClientError> + Send + Sync + 'static,
    {
        self.on_deserialize = Some(Box::new(hook));
        self
    }

    /// The declared (advisory-unique) name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The contributed code map.
    #[inline]
    pub fn codes(&self) -> &CodeMap {
        &self.codes
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("codes", &self.codes.len())
            .field("on_unknown", &self.on_unknown.is_some())
            .field("on_create", &self.on_create.is_some())
            .field("on_serialize", &self.on_serialize.is_some())
            .field("on_deserialize", &self.on_deserialize.is_some())
            .finish()
    }
}

// ============================================================================
// Hook Context
// ============================================================================

/// What a hook may reach: the creation/normalization entry points and a
/// read-only snapshot of the engine's configuration.
///
/// Borrowed per invocation; it cannot outlive the engine call that made it.
pub struct HookContext<'a> {
    engine: &'a Engine,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create a value for a registered code. See [`Engine::create`].
    #[inline]
    pub fn create(&self, code: &str) -> Result<ErrorValue, UnknownCode> {
        self.engine.create(code)
    }

    /// Create a value with explicit details. See [`Engine::create_with`].
    #[inline]
    pub fn create_with(&self, code: &str, details: Value) -> Result<ErrorValue, UnknownCode> {
        self.engine.create_with(code, details)
    }

    /// Normalize an arbitrary failure. See [`Engine::ensure`].
    ///
    /// Calling this on the input the hook itself is handling recurses
    /// through the pipeline - the caller's responsibility to avoid.
    #[inline]
    pub fn ensure(&self, raw: impl Into<Unknown>) -> ErrorValue {
        self.engine.ensure(raw)
    }

    /// The engine's application label.
    #[inline]
    pub fn app(&self) -> Option<&str> {
        self.engine.app()
    }

    /// The engine's environment label (never serialized).
    #[inline]
    pub fn env(&self) -> Option<&str> {
        self.engine.env()
    }

    /// The configured default status.
    #[inline]
    pub fn default_status(&self) -> u16 {
        self.engine.default_status()
    }

    /// The configured default exposure flag.
    #[inline]
    pub fn default_expose(&self) -> bool {
        self.engine.default_expose()
    }

    /// The configured default retry flag.
    #[inline]
    pub fn default_retryable(&self) -> bool {
        self.engine.default_retryable()
    }
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("app", &self.app())
            .field("env", &self.env())
            .finish()
    }
}

// ============================================================================
// Fault Isolation
// ============================================================================

/// Run one hook invocation, converting a panic into a diagnostic.
///
/// Returns `None` when the hook panicked; the caller treats that as "this
/// hook contributed nothing".
pub(crate) fn run_isolated<T>(
    diagnostics: &DiagnosticsChannel,
    origin: DiagnosticOrigin,
    f: impl FnOnce() -> T,
) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            diagnostics.error(
                origin,
                format!("hook panicked: {}", panic_message(payload.as_ref())),
            );
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeEntry;

    #[test]
    fn builder_records_installed_capabilities() {
        let plugin = Plugin::new("caps")
            .with_codes(CodeMap::new().entry("io.failed", CodeEntry::new("IO failed")))
            .on_unknown(|_, _| None)
            .on_create(|_, _| {});

        assert_eq!(plugin.name(), "caps");
        assert_eq!(plugin.codes().len(), 1);
        assert!(plugin.on_unknown.is_some());
        assert!(plugin.on_create.is_some());
        assert!(plugin.on_serialize.is_none());
        assert!(plugin.on_deserialize.is_none());
    }

    #[test]
    fn debug_shows_capability_flags_not_closures() {
        let plugin = Plugin::new("dbg").on_create(|_, _| {});
        let debug = format!("{plugin:?}");
        assert!(debug.contains("on_create: true"));
        assert!(debug.contains("on_unknown: false"));
    }

    #[test]
    fn run_isolated_passes_values_through() {
        let diagnostics = DiagnosticsChannel::new(8);
        let out = run_isolated(&diagnostics, DiagnosticOrigin::plugin("ok", "on_create"), || 7);
        assert_eq!(out, Some(7));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn run_isolated_converts_panics_to_diagnostics() {
        let diagnostics = DiagnosticsChannel::new(8);
        let out: Option<()> = run_isolated(
            &diagnostics,
            DiagnosticOrigin::plugin("broken", "on_unknown"),
            || panic!("kaboom"),
        );

        assert!(out.is_none());
        let entries = diagnostics.all();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("kaboom"));
        assert_eq!(
            entries[0].origin,
            DiagnosticOrigin::plugin("broken", "on_unknown")
        );
    }

    #[test]
    fn mapped_outcome_constructors() {
        let outcome = UnknownOutcome::mapped("io.failed");
        assert!(matches!(
            outcome,
            UnknownOutcome::Mapped { details: None, .. }
        ));

        let outcome = UnknownOutcome::mapped_with("io.failed", serde_json::json!({"n": 1}));
        match outcome {
            UnknownOutcome::Mapped { code, details } => {
                assert_eq!(code, "io.failed");
                assert!(details.is_some());
            }
            UnknownOutcome::Value(_) => panic!("expected mapped"),
        }
    }
}
