//! The serialization boundary: branded wire records and the client mirror.
//!
//! An [`ErrorValue`] travels between processes as a [`SerializedRecord`] -
//! a plain data object whose `__brand` field is the sole discriminator for
//! "this is a transportable error record". The brand is checked by exact
//! value equality, never by type identity: the payload crosses boundaries
//! (JSON, message queues) that erase types, and any object carrying the
//! exact brand value is accepted.
//!
//! # Exposure Policy
//!
//! `details` is present on the wire iff the originating value's exposure
//! flag was true at the moment of serialization, after plugin adaptation.
//! The `env` label never crosses the boundary at all.
//!
//! # Never-Fail Reconstruction
//!
//! Deserialization is total: missing fields default safely, unrecognized
//! codes still reconstruct with a best-effort message, and a forged record
//! claiming the reserved catch-all id is hardened (exposure forced off,
//! tags emptied). Projection and reconstruction precedence live here; the
//! hook chains around them are driven by the engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes::{CodeEntry, LogLevel};
use crate::engine::Engine;
use crate::matcher;
use crate::value::{ErrorValue, TagList};
use crate::BRAND;

// ============================================================================
// Serialized Record
// ============================================================================

/// The wire representation of a failure.
///
/// Field names follow the wire format exactly (camelCase, `__brand`).
/// Everything except the brand, code and message is optional, and absent
/// optionals are omitted from the serialized output so a record
/// round-trips byte-stable.
///
/// ```json
/// { "__brand": "relay_errors", "app": "gateway",
///   "code": "auth.invalid_token", "message": "Invalid token",
///   "status": 401, "retryable": false, "logLevel": "warn",
///   "tags": ["auth"], "details": { "reason": "expired" } }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRecord {
    /// Brand discriminator; must equal [`crate::BRAND`] to be recognized.
    #[serde(rename = "__brand")]
    pub brand: String,
    /// Producing application label, if the producer configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// The dot-qualified code id.
    #[serde(default)]
    pub code: String,
    /// The resolved message. May be empty in forged/partial records;
    /// reconstruction then falls back to the registry or the bare code.
    #[serde(default)]
    pub message: String,
    /// Numeric status, when the producer pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Retry hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Advisory log severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Classification tags; omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Details payload - present iff the producer exposed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl SerializedRecord {
    /// True iff this record carries the exact brand value.
    #[inline]
    pub fn is_branded(&self) -> bool {
        self.brand == BRAND
    }

    /// True iff a JSON value carries the exact brand value.
    pub fn value_is_branded(value: &Value) -> bool {
        value
            .get("__brand")
            .and_then(Value::as_str)
            .is_some_and(|brand| brand == BRAND)
    }

    /// Parse a JSON value into a record, if it is branded and shaped well
    /// enough. Missing optionals default; anything unparseable yields
    /// `None` rather than an error.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !Self::value_is_branded(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

// ============================================================================
// Projection (value → record)
// ============================================================================

/// Project a value to its wire record, enforcing the exposure policy.
///
/// This is the pre-hook record; the engine runs the `on_serialize` chain
/// over the result. `env` is deliberately absent - it never leaves the
/// process.
pub(crate) fn project(value: &ErrorValue) -> SerializedRecord {
    SerializedRecord {
        brand: BRAND.to_owned(),
        app: value.app().map(str::to_owned),
        code: value.code().to_owned(),
        message: value.message().to_owned(),
        status: Some(value.status()),
        retryable: Some(value.is_retryable()),
        log_level: Some(value.log_level()),
        tags: if value.tags().is_empty() {
            None
        } else {
            Some(value.tags().iter().map(|t| t.to_string()).collect())
        },
        details: if value.is_exposed() {
            value.details().cloned()
        } else {
            None
        },
    }
}

// ============================================================================
// Reconstruction (record → value)
// ============================================================================

/// Rebuild a full value from a record on the consuming side.
///
/// Precedence per field: record > registry entry > engine default. The
/// message falls back from the record through the entry's message form
/// (resolved with record-or-entry details) to the bare code string.
/// Reconstructed values capture no backtrace and carry no cause.
pub(crate) fn reconstruct(
    record: &SerializedRecord,
    entry: Option<&CodeEntry>,
    engine: &Engine,
) -> ErrorValue {
    let forged_catch_all = record.code == crate::CATCH_ALL_CODE;

    let details = record
        .details
        .clone()
        .or_else(|| entry.and_then(|e| e.details.clone()));

    let message = if !record.message.is_empty() {
        record.message.clone()
    } else if let Some(entry) = entry {
        entry.message.resolve(details.as_ref())
    } else {
        record.code.clone()
    };

    let tags: TagList = if forged_catch_all {
        TagList::new()
    } else {
        match &record.tags {
            Some(tags) => tags.iter().map(|t| Arc::from(t.as_str())).collect(),
            None => entry
                .map(|e| e.tags.iter().map(|t| Arc::from(t.as_ref())).collect())
                .unwrap_or_default(),
        }
    };

    ErrorValue {
        code: Arc::from(record.code.as_str()),
        message: Arc::from(message),
        status: record
            .status
            .or_else(|| entry.and_then(|e| e.status))
            .unwrap_or_else(|| engine.default_status()),
        expose: if forged_catch_all {
            false
        } else {
            entry
                .and_then(|e| e.expose)
                .unwrap_or_else(|| engine.default_expose())
        },
        retryable: record
            .retryable
            .or_else(|| entry.and_then(|e| e.retryable))
            .unwrap_or_else(|| engine.default_retryable()),
        log_level: record
            .log_level
            .or_else(|| entry.and_then(|e| e.log_level))
            .unwrap_or(LogLevel::Error),
        tags,
        details,
        cause: None,
        app: record
            .app
            .as_deref()
            .or_else(|| engine.app())
            .map(Arc::from),
        env: engine.env().map(Arc::from),
        backtrace: None,
    }
}

// ============================================================================
// Client Mirror
// ============================================================================

/// The lighter client-side mirror of a failure.
///
/// Consumers that only route and display errors do not need the full
/// [`ErrorValue`] (no exposure flag, no env, no cause, no backtrace).
/// Reconstructed by [`Engine::deserialize_client`] - plugins get the first
/// word via `on_deserialize`, this type is the fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientError {
    code: Arc<str>,
    message: Arc<str>,
    status: u16,
    retryable: bool,
    tags: Vec<String>,
    details: Option<Value>,
}

impl ClientError {
    /// Mirror a record with client-side defaults (status 500, not
    /// retryable). A record claiming the reserved catch-all id gets the
    /// same hardening as the full reconstruction: its tags are dropped.
    pub fn from_record(record: &SerializedRecord) -> Self {
        let forged_catch_all = record.code == crate::CATCH_ALL_CODE;
        Self {
            code: Arc::from(record.code.as_str()),
            message: if record.message.is_empty() {
                Arc::from(record.code.as_str())
            } else {
                Arc::from(record.message.as_str())
            },
            status: record.status.unwrap_or(500),
            retryable: record.retryable.unwrap_or(false),
            tags: if forged_catch_all {
                Vec::new()
            } else {
                record.tags.clone().unwrap_or_default()
            },
            details: record.details.clone(),
        }
    }

    /// Assemble a mirror directly - for `on_deserialize` hooks that build
    /// their own.
    pub fn new(
        code: impl Into<Arc<str>>,
        message: impl Into<Arc<str>>,
        status: u16,
        retryable: bool,
        tags: Vec<String>,
        details: Option<Value>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
            retryable,
            tags,
            details,
        }
    }

    /// The dot-qualified code id.
    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The carried (or fallback) message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric status.
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Retry hint.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Classification tags.
    #[inline]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Details, exactly as the producer exposed them.
    #[inline]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Pattern check, for routing on the consuming side.
    #[inline]
    pub fn code_matches(&self, pattern: &str) -> bool {
        matcher::matches(&self.code, pattern)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ClientError {}

// ============================================================================
// Tests
// ============================================================================
