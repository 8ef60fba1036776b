//! Wildcard pattern matching over dot-qualified code ids.
//!
//! A pattern is either an exact code id (`auth.invalid_token`) or a prefix
//! followed by the wildcard terminator (`auth.*`). Patterns are never
//! stored by the engine - hosts evaluate them against candidate sets at
//! routing time, typically to pick an error handler.
//!
//! Only the trailing `*` is stripped when matching, so `auth.*` covers
//! `auth.invalid_token` and `auth.rate_limited` but not `authx.token`:
//! the dot stays part of the prefix.
//!
//! # Selection
//!
//! [`best_match`] ranks candidates: an exact match wins outright; otherwise
//! the matching wildcard with the longest prefix (most specific) wins;
//! otherwise `None`, signalling the caller to fall back to its own default
//! handler. Two wildcards of equal prefix length tie-break to whichever
//! appears first in the supplied slice.

/// Terminator marking a pattern as a wildcard prefix.
pub const WILDCARD_TERMINATOR: &str = ".*";

/// True iff the pattern ends with the wildcard terminator.
///
/// ```rust
/// use relay_errors::matcher::is_wildcard;
///
/// assert!(is_wildcard("auth.*"));
/// assert!(!is_wildcard("auth.invalid_token"));
/// ```
#[inline]
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.ends_with(WILDCARD_TERMINATOR)
}

/// True iff `code` satisfies `pattern` - exact equality, or a wildcard
/// whose prefix (the pattern minus its trailing `*`) starts the code.
///
/// ```rust
/// use relay_errors::matcher::matches;
///
/// assert!(matches("auth.invalid_token", "auth.invalid_token"));
/// assert!(matches("auth.invalid_token", "auth.*"));
/// assert!(!matches("billing.payment_failed", "auth.*"));
/// ```
#[inline]
pub fn matches(code: &str, pattern: &str) -> bool {
    if code == pattern {
        return true;
    }
    if !is_wildcard(pattern) {
        return false;
    }
    // Strip only the `*`; the dot stays, so `auth.*` cannot cover `authx.y`.
    code.starts_with(&pattern[..pattern.len() - 1])
}

/// Pick the most specific candidate matching `code`.
///
/// Priority: exact match, then the longest matching wildcard prefix, then
/// `None`. Apart from the documented first-wins tie-break between
/// equal-length wildcards, the result depends only on the candidate set's
/// contents, not its order.
///
/// ```rust
/// use relay_errors::matcher::best_match;
///
/// let candidates = ["auth.invalid_token", "auth.*", "default"];
/// assert_eq!(
///     best_match("auth.invalid_token", &candidates),
///     Some("auth.invalid_token")
/// );
/// assert_eq!(best_match("auth.rate_limited", &candidates), Some("auth.*"));
/// assert_eq!(best_match("billing.payment_failed", &candidates), None);
/// ```
pub fn best_match<'a, S: AsRef<str>>(code: &str, candidates: &'a [S]) -> Option<&'a str> {
    let mut best: Option<&'a str> = None;

    for candidate in candidates {
        let pattern = candidate.as_ref();
        if pattern == code {
            return Some(pattern);
        }
        if !is_wildcard(pattern) || !matches(code, pattern) {
            continue;
        }
        // Strict `>` keeps the first of two equal-length wildcards.
        if best.is_none_or(|current| pattern.len() > current.len()) {
            best = Some(pattern);
        }
    }

    best
}

// ============================================================================
// Tests
// ============================================================================
