//! Declaration macro for code maps.
//!
//! Registries are data, and writing them as builder chains buries the ids
//! under method noise. The [`codes!`](crate::codes!) macro keeps the tree
//! shape visible: string keys on the left, entries or `{ }` groups on the
//! right, one level deep, exactly what the registry flattener accepts.
//!
//! Expansion is pure - no side effects, no I/O, just `CodeMap` pushes in
//! declaration order.

/// Build a [`CodeMap`](crate::CodeMap) from `key => entry` and
/// `key => { ... }` pairs.
///
/// Group values nest exactly one level, mirroring the registry's
/// flattening rule; entries inside a group land under `group.key`.
///
/// # Example
///
/// ```rust
/// use relay_errors::{codes, CodeEntry, Engine, LogLevel};
///
/// let engine = Engine::new(codes! {
///     "auth" => {
///         "invalid_token" => CodeEntry::new("Invalid or expired token")
///             .with_status(401)
///             .with_level(LogLevel::Warn),
///         "rate_limited" => CodeEntry::new("Too many attempts")
///             .with_status(429)
///             .with_retryable(true),
///     },
///     "timeout" => CodeEntry::new("Operation timed out").with_retryable(true),
/// });
///
/// assert!(engine.registry().contains("auth.invalid_token"));
/// assert!(engine.registry().contains("timeout"));
/// ```
#[macro_export]
macro_rules! codes {
    () => { $crate::CodeMap::new() };
    ( $($tokens:tt)+ ) => {{
        let mut map = $crate::CodeMap::new();
        $crate::__codes_nodes!(map; $($tokens)+);
        map
    }};
}

/// Token muncher behind [`codes!`]. Not part of the public API.
#[doc(hidden)]
#[macro_export]
macro_rules! __codes_nodes {
    ($map:ident; ) => {};
    ($map:ident; $key:literal => { $($group:tt)* } $(, $($rest:tt)*)?) => {
        $map.push_group($key, $crate::codes! { $($group)* });
        $( $crate::__codes_nodes!($map; $($rest)*); )?
    };
    ($map:ident; $key:literal => $entry:expr $(, $($rest:tt)*)?) => {
        $map.push_entry($key, $entry);
        $( $crate::__codes_nodes!($map; $($rest)*); )?
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::codes::{CodeDef, CodeEntry};

    #[test]
    fn empty_invocation_yields_empty_map() {
        let map = codes! {};
        assert!(map.is_empty());
    }

    #[test]
    fn mixes_leaves_and_groups() {
        let map = codes! {
            "auth" => {
                "invalid_token" => CodeEntry::new("Invalid token"),
                "rate_limited" => CodeEntry::new("Slow down"),
            },
            "timeout" => CodeEntry::new("Timed out"),
        };

        assert_eq!(map.len(), 2);
        let nodes = map.nodes();
        assert!(matches!(nodes[0], (ref k, CodeDef::Group(ref g)) if k == "auth" && g.len() == 2));
        assert!(matches!(nodes[1], (ref k, CodeDef::Entry(_)) if k == "timeout"));
    }

    #[test]
    fn trailing_commas_are_optional() {
        let with = codes! { "a" => CodeEntry::new("A"), };
        let without = codes! { "a" => CodeEntry::new("A") };
        assert_eq!(with.len(), without.len());
    }

    #[test]
    fn empty_groups_are_allowed() {
        let map = codes! { "hollow" => {} };
        assert_eq!(map.len(), 1);
        assert!(matches!(map.nodes()[0].1, CodeDef::Group(ref g) if g.is_empty()));
    }

    #[test]
    fn declaration_order_is_preserved() {
        let map = codes! {
            "b" => CodeEntry::new("B"),
            "a" => CodeEntry::new("A"),
        };
        assert_eq!(map.nodes()[0].0, "b");
        assert_eq!(map.nodes()[1].0, "a");
    }
}
