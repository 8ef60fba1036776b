//! # Relay Errors
//!
//! Typed error-code registry and cross-boundary normalization engine.
//!
//! ## Design Philosophy
//!
//! 1. **Every failure gets a code** - a dot-qualified id declared once in
//!    a registry, carrying its status, message form and advisory metadata
//! 2. **Normalization is total** - `ensure` turns *any* input into a valid
//!    error value and never fails doing it
//! 3. **Extensions never break the engine** - plugin hooks run in order,
//!    isolated; a panicking hook is a diagnostic, not an abort
//! 4. **The boundary is explicit** - values cross processes as branded
//!    plain records, and details cross only when the code exposes them
//! 5. **Everything is frozen at construction** - registry and plugin list
//!    are built once and read-only, so one engine serves all threads
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_errors::{codes, CodeEntry, Engine};
//!
//! let engine = Engine::builder()
//!     .app("gateway")
//!     .codes(codes! {
//!         "auth" => {
//!             "invalid_token" => CodeEntry::new("Invalid or expired token")
//!                 .with_status(401),
//!             "rate_limited" => CodeEntry::new("Too many attempts")
//!                 .with_status(429)
//!                 .with_retryable(true),
//!         },
//!     })
//!     .build();
//!
//! // The creation path: the only operation that can fail, and only on an
//! // unregistered code.
//! let err = engine
//!     .create_with("auth.invalid_token", serde_json::json!({"reason": "expired"}))
//!     .unwrap();
//! assert_eq!(err.status(), 401);
//!
//! // The boundary: exposure-enforced wire records, reconstructed on the
//! // consuming side.
//! let record = engine.serialize(&err);
//! let back = engine.deserialize(&record);
//! assert_eq!(back.code(), "auth.invalid_token");
//! ```
//!
//! ## Normalizing Arbitrary Failures
//!
//! ```rust
//! use relay_errors::{codes, CodeEntry, Engine};
//!
//! let engine = Engine::new(codes! {
//!     "io" => { "failed" => CodeEntry::new("I/O failed").with_retryable(true) },
//! });
//!
//! // Any input becomes a valid value; unmapped inputs land on the
//! // reserved catch-all with the raw value kept as opaque detail.
//! let err = engine.ensure("disk on fire");
//! assert!(err.is_catch_all());
//!
//! // A call-site fallback code takes precedence over the catch-all.
//! let err = engine.ensure_with(std::io::Error::other("gone"), "io.failed");
//! assert_eq!(err.code(), "io.failed");
//! assert!(err.is_retryable());
//! ```
//!
//! ## Routing by Pattern
//!
//! ```rust
//! use relay_errors::matcher::best_match;
//!
//! let handlers = ["auth.invalid_token", "auth.*"];
//! assert_eq!(
//!     best_match("auth.rate_limited", &handlers),
//!     Some("auth.*")
//! );
//! ```
//!
//! ## Plugins
//!
//! Plugins are ordered capability records: contributed codes plus optional
//! `on_unknown` / `on_create` / `on_serialize` / `on_deserialize` hooks.
//! See [`Plugin`] for semantics and [`diagnostics`] for where faulting
//! hooks end up.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codes;
pub mod convenience;
pub mod diagnostics;
pub mod engine;
pub mod http;
pub mod matcher;
pub mod plugin;
pub mod value;
pub mod wire;

pub use codes::{CodeDef, CodeEntry, CodeMap, LogLevel, Message, MessageFn, Registry, UnknownCode};
pub use diagnostics::{Diagnostic, DiagnosticOrigin, DiagnosticsChannel};
pub use engine::{Engine, EngineBuilder, UnknownMapper};
pub use http::{HttpBody, HttpFailure};
pub use plugin::{
    HookContext, OnCreateFn, OnDeserializeFn, OnSerializeFn, OnUnknownFn, Plugin, UnknownOutcome,
};
pub use value::{ErrorValue, Unknown};
pub use wire::{ClientError, SerializedRecord};

/// Brand value carried in every wire record's `__brand` field.
///
/// The sole discriminator for "this is a transportable error record":
/// checked by exact value equality, never by type identity, because the
/// payload crosses boundaries that erase types.
pub const BRAND: &str = "relay_errors";

/// The reserved catch-all code id.
///
/// Never user-definable; every unmapped failure lands here as a fresh
/// value. Records claiming this id are hardened on reconstruction
/// (exposure forced off, tags emptied).
pub const CATCH_ALL_CODE: &str = "internal.unhandled";

/// Result alias for the `safe` control path.
pub type Result<T> = std::result::Result<T, ErrorValue>;
