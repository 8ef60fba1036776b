//! Code definitions and the flattened registry.
//!
//! Every failure class is named by a dot-qualified string id
//! (e.g. `auth.invalid_token`). Ids are declared in a [`CodeMap`] - a flat
//! or one-level-nested definition tree - and flattened exactly once, at
//! engine construction, into a [`Registry`]: a single lookup table from id
//! to [`CodeEntry`].
//!
//! # Construction Rules
//!
//! - A tree node holding a [`CodeEntry`] is a leaf, stored under its joined
//!   path (`group.key`).
//! - A group nested inside another group is an invalid shape: it is skipped
//!   and a diagnostic is recorded. The flattened table never reflects more
//!   than one level.
//! - Plugin-contributed code maps are merged on top of the user map in
//!   plugin declaration order. A later contributor silently wins on id
//!   collision, but every override is recorded in the diagnostics channel
//!   so the host can audit (or fail loudly on) the overlap.
//! - The reserved catch-all id ([`crate::CATCH_ALL_CODE`]) is never
//!   user-definable; attempts are skipped with a diagnostic.
//!
//! After construction the registry is immutable - no further merges happen,
//! and every other component reads from it without locking.
//!
//! # Message Forms
//!
//! A [`CodeEntry`] message is either a static string, a `{field}` template
//! interpolated against the details payload, or a computed function of the
//! details. Both dynamic forms run synchronously at creation time and must
//! not block; the resolved string is frozen into the error value.
//!
//! ```rust
//! use relay_errors::{codes, CodeEntry, Engine};
//!
//! let engine = Engine::new(codes! {
//!     "billing" => {
//!         "retry_later" => CodeEntry::templated("Retry after {retryAfter}s")
//!             .with_details(serde_json::json!({ "retryAfter": 45 }))
//!             .with_retryable(true),
//!     },
//! });
//!
//! let err = engine.create("billing.retry_later").unwrap();
//! assert_eq!(err.message(), "Retry after 45s");
//! ```

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};
use crate::plugin::Plugin;

// ============================================================================
// Log Severity
// ============================================================================

/// Advisory log severity attached to a failure class.
///
/// The engine never acts on this itself - it is metadata for the host's
/// logging pipeline, carried through creation and across the serialization
/// boundary under the wire key `logLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics, normally filtered out.
    Debug,
    /// Routine, expected domain failures.
    Info,
    /// Degraded but recoverable conditions.
    Warn,
    /// Failures requiring attention. The engine-wide default.
    Error,
    /// Failures after which the process should not continue.
    Fatal,
}

impl LogLevel {
    /// Lowercase wire/display name. Zero allocation.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Message Resolution
// ============================================================================

/// Signature of a computed message: a pure, synchronous function of the
/// resolved details payload.
pub type MessageFn = dyn Fn(&Value) -> String + Send + Sync;

/// How a code's message is produced from its details payload.
///
/// Resolution happens exactly once, when the error value is created or
/// reconstructed; the error value stores only the resolved string.
#[derive(Clone)]
pub enum Message {
    /// Used verbatim, details ignored.
    Static(Cow<'static, str>),
    /// `{field}` placeholders replaced by the matching details fields.
    /// A placeholder with no matching field is left as written.
    Template(Cow<'static, str>),
    /// Invoked synchronously with the resolved details (or `Value::Null`
    /// when no details exist). Must not block or panic.
    Compute(Arc<MessageFn>),
}

impl Message {
    /// Resolve this message against an optional details payload.
    pub fn resolve(&self, details: Option<&Value>) -> String {
        match self {
            Self::Static(s) => s.clone().into_owned(),
            Self::Template(t) => interpolate(t, details),
            Self::Compute(f) => f(details.unwrap_or(&Value::Null)),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

impl From<&'static str> for Message {
    fn from(value: &'static str) -> Self {
        Self::Static(Cow::Borrowed(value))
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Static(Cow::Owned(value))
    }
}

/// Replace `{field}` placeholders with the matching details fields.
///
/// String fields are inserted without quotes; other JSON values use their
/// compact rendering. Placeholders without a matching field (and stray
/// braces) pass through verbatim.
fn interpolate(template: &str, details: Option<&Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let name = &tail[1..close];
        match details.and_then(|d| d.get(name)) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

// ============================================================================
// Code Entry
// ============================================================================

/// Static per-code metadata, declared once and frozen into the registry.
///
/// Every field except the message is optional: an unset field defers first
/// to the engine's configured defaults and then to the engine's hard
/// defaults (status 500, expose false, retryable false, severity error,
/// empty tags).
///
/// # Example
///
/// ```rust
/// use relay_errors::{CodeEntry, LogLevel};
///
/// let entry = CodeEntry::new("Invalid or expired token")
///     .with_status(401)
///     .with_level(LogLevel::Warn)
///     .with_tag("auth");
/// ```
#[derive(Clone, Debug)]
pub struct CodeEntry {
    pub(crate) message: Message,
    pub(crate) status: Option<u16>,
    pub(crate) details: Option<Value>,
    pub(crate) expose: Option<bool>,
    pub(crate) retryable: Option<bool>,
    pub(crate) log_level: Option<LogLevel>,
    pub(crate) tags: Vec<Cow<'static, str>>,
}

impl CodeEntry {
    /// Entry with a static message.
    #[inline]
    pub fn new(message: impl Into<Message>) -> Self {
        Self::from_message(message.into())
    }

    /// Entry with a `{field}` template message.
    #[inline]
    pub fn templated(template: impl Into<Cow<'static, str>>) -> Self {
        Self::from_message(Message::Template(template.into()))
    }

    /// Entry with a computed message.
    ///
    /// The function must be pure and synchronous; it runs on the creating
    /// thread with the resolved details.
    #[inline]
    pub fn computed(f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        Self::from_message(Message::Compute(Arc::new(f)))
    }

    fn from_message(message: Message) -> Self {
        Self {
            message,
            status: None,
            details: None,
            expose: None,
            retryable: None,
            log_level: None,
            tags: Vec::new(),
        }
    }

    /// Pin the numeric status for this code.
    #[inline]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Default details payload, used when the caller supplies none.
    #[inline]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this code's details may cross the serialization boundary.
    #[inline]
    pub fn with_expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Whether callers may retry the failed operation.
    #[inline]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Advisory log severity for this code.
    #[inline]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Append a routing/classification tag. Order is preserved.
    #[inline]
    pub fn with_tag(mut self, tag: impl Into<Cow<'static, str>>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the whole tag list.
    #[inline]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The declared message form.
    #[inline]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The declared status, if pinned.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The declared default details, if any.
    #[inline]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// The declared exposure flag, if pinned.
    #[inline]
    pub fn expose(&self) -> Option<bool> {
        self.expose
    }

    /// The declared retry flag, if pinned.
    #[inline]
    pub fn retryable(&self) -> Option<bool> {
        self.retryable
    }

    /// The declared log severity, if pinned.
    #[inline]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Declared tags, in declaration order.
    #[inline]
    pub fn tags(&self) -> &[Cow<'static, str>] {
        &self.tags
    }
}

// ============================================================================
// Definition Tree
// ============================================================================

/// One node of the definition tree: a leaf entry or a one-level group.
#[derive(Clone, Debug)]
pub enum CodeDef {
    /// A leaf, stored under its joined path.
    Entry(CodeEntry),
    /// A named group of leaves. Groups do not nest further.
    Group(CodeMap),
}

/// The user-facing definition tree, at most one level deep.
///
/// Declaration order is preserved - it determines nothing for lookup, but
/// keeps collision diagnostics deterministic. Usually built with the
/// [`codes!`](crate::codes!) macro.
#[derive(Clone, Debug, Default)]
pub struct CodeMap {
    nodes: Vec<(Cow<'static, str>, CodeDef)>,
}

impl CodeMap {
    /// Empty map.
    #[inline]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a leaf entry under `key`, builder style.
    #[inline]
    pub fn entry(mut self, key: impl Into<Cow<'static, str>>, entry: CodeEntry) -> Self {
        self.push_entry(key, entry);
        self
    }

    /// Add a group of entries under `key`, builder style.
    #[inline]
    pub fn group(mut self, key: impl Into<Cow<'static, str>>, group: CodeMap) -> Self {
        self.push_group(key, group);
        self
    }

    /// Add a leaf entry in place. Used by the `codes!` macro expansion.
    #[inline]
    pub fn push_entry(&mut self, key: impl Into<Cow<'static, str>>, entry: CodeEntry) {
        self.nodes.push((key.into(), CodeDef::Entry(entry)));
    }

    /// Add a group in place. Used by the `codes!` macro expansion.
    #[inline]
    pub fn push_group(&mut self, key: impl Into<Cow<'static, str>>, group: CodeMap) {
        self.nodes.push((key.into(), CodeDef::Group(group)));
    }

    /// Number of direct nodes (leaves and groups).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no nodes were declared.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn nodes(&self) -> &[(Cow<'static, str>, CodeDef)] {
        &self.nodes
    }
}

// ============================================================================
// Unknown-Code Fault
// ============================================================================

/// The only creation-time hard failure: `create` was called with an id
/// absent from the registry.
///
/// This is a caller defect, not a domain condition - it is never retried
/// and never caught internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode {
    code: String,
}

impl UnknownCode {
    pub(crate) fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// The id that failed the lookup.
    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error code `{}` is not registered", self.code)
    }
}

impl std::error::Error for UnknownCode {}

// ============================================================================
// Registry
// ============================================================================

/// The flattened, immutable id → [`CodeEntry`] table.
///
/// Built once at engine construction from the user map plus plugin
/// contributions; read-only afterwards, so it is shared freely across
/// threads without locking.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, CodeEntry>,
}

impl Registry {
    /// Flatten the user map and merge plugin contributions on top.
    pub(crate) fn build(
        user: &CodeMap,
        plugins: &[Plugin],
        diagnostics: &DiagnosticsChannel,
    ) -> Self {
        let mut entries = HashMap::new();

        flatten_into(&mut entries, None, user, diagnostics, "engine");

        let mut seen = HashSet::new();
        for plugin in plugins {
            if !seen.insert(plugin.name().to_owned()) {
                diagnostics.warn(
                    DiagnosticOrigin::Registry,
                    format!("duplicate plugin name `{}`", plugin.name()),
                );
            }
            flatten_into(
                &mut entries,
                None,
                plugin.codes(),
                diagnostics,
                plugin.name(),
            );
        }

        Self { entries }
    }

    /// Look up the entry for a dot-qualified id.
    #[inline]
    pub fn get(&self, code: &str) -> Option<&CodeEntry> {
        self.entries.get(code)
    }

    /// True if the id is registered.
    #[inline]
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of registered ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the registered ids, in no particular order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Flatten one map level into the accumulated table.
///
/// `source` names the contributor (the engine itself or a plugin) for
/// collision diagnostics. Groups below the first level are the invalid
/// shape and are skipped.
fn flatten_into(
    entries: &mut HashMap<String, CodeEntry>,
    prefix: Option<&str>,
    map: &CodeMap,
    diagnostics: &DiagnosticsChannel,
    source: &str,
) {
    for (key, def) in map.nodes() {
        let id = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone().into_owned(),
        };
        match def {
            CodeDef::Entry(entry) => {
                insert_entry(entries, id, entry.clone(), diagnostics, source);
            }
            CodeDef::Group(group) if prefix.is_none() => {
                flatten_into(entries, Some(&id), group, diagnostics, source);
            }
            CodeDef::Group(_) => {
                diagnostics.warn(
                    DiagnosticOrigin::Registry,
                    format!("group `{id}` nested beyond one level; skipped"),
                );
            }
        }
    }
}

fn insert_entry(
    entries: &mut HashMap<String, CodeEntry>,
    id: String,
    entry: CodeEntry,
    diagnostics: &DiagnosticsChannel,
    source: &str,
) {
    if id == crate::CATCH_ALL_CODE {
        diagnostics.warn(
            DiagnosticOrigin::Registry,
            format!("`{id}` is reserved and cannot be registered (from {source}); skipped"),
        );
        return;
    }
    if entries.contains_key(&id) {
        diagnostics.warn(
            DiagnosticOrigin::Registry,
            format!("code `{id}` redefined by {source}; later definition wins"),
        );
    }
    entries.insert(id, entry);
}

// ============================================================================
// Tests
// ============================================================================
