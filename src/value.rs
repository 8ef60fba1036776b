//! The normalized error value and the `Unknown` input model.
//!
//! [`ErrorValue`] is the runtime failure record: a code, a message resolved
//! once at creation, advisory metadata (status, exposure, retry hint, log
//! severity, tags), an opaque details payload and an optional reference to
//! the originating value. It is created exactly once - by the creation path
//! or the deserialization path - and never mutated afterwards. `Clone` is a
//! cheap structural copy: strings, cause and backtrace are shared.
//!
//! [`Unknown`] is the Rust rendition of "any input" handed to the
//! normalization path: an already-normalized value, a JSON payload, a boxed
//! [`std::error::Error`], a plain message, or a panic payload recovered by
//! `safe`. Conversions cover the common cases so call sites write
//! `engine.ensure(err)` without ceremony.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::matcher;
use crate::LogLevel;

// ============================================================================
// Unknown Input
// ============================================================================

/// Any value the normalization path may be handed.
///
/// Hosts rarely construct this directly - the `From` conversions and
/// [`Unknown::from_error`] cover typical call sites, and `safe` produces
/// the [`Unknown::Panic`] variant itself.
pub enum Unknown {
    /// An already-normalized value. `ensure` returns it untouched.
    Value(ErrorValue),
    /// Structured data - possibly a branded serialized record.
    Json(Value),
    /// A boxed standard error.
    Error(Box<dyn std::error::Error + Send + Sync>),
    /// A bare textual failure.
    Text(String),
    /// A panic payload's conventional string form, as recovered by
    /// `catch_unwind`. Only the rendering is kept - the payload itself is
    /// not `Sync` and would stop error values from crossing threads.
    Panic(String),
}

impl Unknown {
    /// Wrap any standard error.
    ///
    /// Exists alongside the `From` impls because a blanket
    /// `impl From<E: Error>` would collide with them.
    #[inline]
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Error(Box::new(error))
    }

    /// Wrap a panic payload, keeping its conventional string form.
    #[inline]
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Self::Panic(panic_message(payload.as_ref()).to_owned())
    }

    /// Best-effort one-line rendering, used in catch-all messages and
    /// diagnostics.
    pub fn render(&self) -> String {
        match self {
            Self::Value(v) => v.message().to_owned(),
            Self::Json(v) => v.to_string(),
            Self::Error(e) => e.to_string(),
            Self::Text(s) | Self::Panic(s) => s.clone(),
        }
    }

    /// Project this input into an opaque JSON detail for the catch-all
    /// value. Structured inputs keep their structure; everything else
    /// becomes its rendering.
    pub(crate) fn to_detail(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            other => Value::String(other.render()),
        }
    }
}

impl fmt::Debug for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Panic(s) => f.debug_tuple("Panic").field(s).finish(),
        }
    }
}

impl From<ErrorValue> for Unknown {
    fn from(value: ErrorValue) -> Self {
        Self::Value(value)
    }
}

impl From<Value> for Unknown {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Unknown {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Unknown {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Unknown {
    fn from(value: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Error(value)
    }
}

impl From<std::io::Error> for Unknown {
    fn from(value: std::io::Error) -> Self {
        Self::Error(Box::new(value))
    }
}

impl From<serde_json::Error> for Unknown {
    fn from(value: serde_json::Error) -> Self {
        Self::Error(Box::new(value))
    }
}

/// Extract the conventional string payload from a panic, if any.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "opaque panic payload"
    }
}

// ============================================================================
// Error Value
// ============================================================================

/// List type for tags; inline up to four, the common case.
pub(crate) type TagList = SmallVec<[Arc<str>; 4]>;

/// An immutable, normalized failure record.
///
/// All metadata is advisory: the engine resolves and carries it but never
/// acts on it. Exposure in particular only gates whether `details` crosses
/// the serialization boundary.
///
/// # Example
///
/// ```rust
/// use relay_errors::{codes, CodeEntry, Engine};
///
/// let engine = Engine::new(codes! {
///     "auth" => {
///         "invalid_token" => CodeEntry::new("Invalid token").with_status(401),
///     },
/// });
///
/// let err = engine.create("auth.invalid_token").unwrap();
/// assert_eq!(err.code(), "auth.invalid_token");
/// assert_eq!(err.status(), 401);
/// assert!(err.code_matches("auth.*"));
/// ```
#[derive(Clone)]
pub struct ErrorValue {
    pub(crate) code: Arc<str>,
    pub(crate) message: Arc<str>,
    pub(crate) status: u16,
    pub(crate) expose: bool,
    pub(crate) retryable: bool,
    pub(crate) log_level: LogLevel,
    pub(crate) tags: TagList,
    pub(crate) details: Option<Value>,
    pub(crate) cause: Option<Arc<Unknown>>,
    pub(crate) app: Option<Arc<str>>,
    pub(crate) env: Option<Arc<str>>,
    pub(crate) backtrace: Option<Arc<Backtrace>>,
}

impl ErrorValue {
    /// The dot-qualified code id.
    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The message, resolved once at creation or reconstruction.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric status (HTTP-shaped; engine default 500).
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether `details` may cross the serialization boundary.
    #[inline]
    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    /// Whether callers may retry the failed operation.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Advisory log severity.
    #[inline]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Classification tags, in declaration order.
    #[inline]
    pub fn tags(&self) -> &[Arc<str>] {
        &self.tags
    }

    /// True if any tag equals `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.as_ref() == tag)
    }

    /// The opaque details payload, if any.
    #[inline]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// The originating value this record was normalized from, if any.
    #[inline]
    pub fn cause(&self) -> Option<&Unknown> {
        self.cause.as_deref()
    }

    /// Application label inherited from the engine options.
    #[inline]
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// Environment label. Carried in-process only - never serialized.
    #[inline]
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// Backtrace captured at creation, when the engine was built with
    /// stack capture enabled. Reconstructed values carry none.
    #[inline]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// True iff this value's code satisfies the pattern - exact id or
    /// wildcard prefix. See [`crate::matcher`].
    #[inline]
    pub fn code_matches(&self, pattern: &str) -> bool {
        matcher::matches(&self.code, pattern)
    }

    /// True iff this is the reserved catch-all value.
    #[inline]
    pub fn is_catch_all(&self) -> bool {
        self.code.as_ref() == crate::CATCH_ALL_CODE
    }
}

impl fmt::Display for ErrorValue {
    /// `code: message`, with a retry marker when applicable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if self.retryable {
            f.write_str(" (retryable)")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorValue")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("expose", &self.expose)
            .field("retryable", &self.retryable)
            .field("log_level", &self.log_level)
            .field("tags", &self.tags)
            .field("details", &self.details)
            .field("cause", &self.cause.as_ref().map(|_| "<present>"))
            .field("app", &self.app)
            .field("env", &self.env)
            .field("backtrace", &self.backtrace.as_ref().map(|_| "<captured>"))
            .finish()
    }
}

impl std::error::Error for ErrorValue {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.cause.as_deref() {
            Some(Unknown::Error(e)) => Some(e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
