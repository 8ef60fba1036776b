//! HTTP projection of normalized failures.
//!
//! A thin convenience over `ensure` + `serialize` for handlers that end a
//! request with an error payload: the response status comes from the
//! normalized value, the body wraps the wire record under an `error` key.
//! No HTTP machinery is involved - the host hands these to whatever
//! framework it runs.

use serde::Serialize;

use crate::engine::Engine;
use crate::value::Unknown;
use crate::wire::SerializedRecord;

/// Status plus serializable body for an error response.
///
/// ```json
/// { "status": 401, "body": { "error": { "__brand": "...", ... } } }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HttpFailure {
    /// Response status, taken from the normalized value.
    pub status: u16,
    /// Response body.
    pub body: HttpBody,
}

/// The body wrapper: the wire record under an `error` key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HttpBody {
    /// The serialized, exposure-enforced record.
    pub error: SerializedRecord,
}

impl Engine {
    /// Normalize any failure and project it to an HTTP response shape.
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
    /// let response = engine.http_from(err);
    /// assert_eq!(response.status, 401);
    /// assert_eq!(response.body.error.code, "auth.invalid_token");
    /// ```
    pub fn http_from(&self, raw: impl Into<Unknown>) -> HttpFailure {
        let value = self.ensure(raw);
        HttpFailure {
            status: value.status(),
            body: HttpBody {
                error: self.serialize(&value),
            },
        }
    }

    /// [`Engine::http_from`] with a call-site fallback code.
    pub fn http_from_with(&self, raw: impl Into<Unknown>, fallback_code: &str) -> HttpFailure {
        let value = self.ensure_with(raw, fallback_code);
        HttpFailure {
            status: value.status(),
            body: HttpBody {
                error: self.serialize(&value),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
