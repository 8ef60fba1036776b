//! Property-based tests for relay_errors
//!
//! These tests use proptest to generate random inputs and verify invariants hold.

use proptest::prelude::*;
use relay_errors::{codes, CodeEntry, Engine, LogLevel, SerializedRecord, Unknown, BRAND};
use serde_json::json;

fn engine() -> Engine {
    Engine::builder()
        .app("prop")
        .env("test")
        .capture_stack(false)
        .codes(codes! {
            "auth" => {
                "invalid_token" => CodeEntry::new("Invalid token")
                    .with_status(401)
                    .with_expose(true)
                    .with_level(LogLevel::Warn)
                    .with_tag("auth"),
                "rate_limited" => CodeEntry::new("Too many attempts")
                    .with_status(429)
                    .with_retryable(true),
            },
            "billing" => {
                "retry_later" => CodeEntry::templated("Retry after {retryAfter}s")
                    .with_details(json!({"retryAfter": 45}))
                    .with_expose(true)
                    .with_retryable(true),
            },
        })
        .build()
}

// ============================================================================
// NORMALIZATION TOTALITY
// ============================================================================

proptest! {
    /// `ensure` must accept arbitrary text without panicking and always
    /// yield a valid value.
    #[test]
    fn ensure_is_total_for_text(s in "\\PC*") {
        let engine = engine();
        let err = engine.ensure(s.as_str());
        prop_assert!(err.is_catch_all());
        prop_assert!(!err.is_exposed());
    }

    /// `ensure` must accept arbitrary JSON-ish structures without
    /// panicking, branded or not.
    #[test]
    fn ensure_is_total_for_json(
        key in "[a-z]{1,8}",
        n in any::<i64>(),
        brand_it in any::<bool>(),
    ) {
        let engine = engine();
        let mut value = json!({ key: n });
        if brand_it {
            value["__brand"] = json!(BRAND);
            value["code"] = json!("auth.invalid_token");
        }

        // Both paths must produce something valid; only the branded one
        // may escape the catch-all.
        let err = engine.ensure(value);
        if !brand_it {
            prop_assert!(err.is_catch_all());
        }
        prop_assert!(!err.code().is_empty());
        prop_assert!(!err.message().is_empty());
    }

    /// `safe` converts every failing thunk - error or panic - into a
    /// normalized value.
    #[test]
    fn safe_never_lets_failures_escape(message in "\\PC{1,64}", should_panic in any::<bool>()) {
        let engine = engine();
        let msg = message.clone();
        let result: Result<(), _> = engine.safe(move || {
            if should_panic {
                panic!("{msg}");
            }
            Err(Unknown::Text(msg.clone()))
        });
        let err = result.unwrap_err();
        prop_assert!(err.is_catch_all());
        prop_assert_eq!(err.details(), Some(&json!(message)));
    }
}

// ============================================================================
// BOUNDARY PROPERTIES
// ============================================================================

proptest! {
    /// For every exposable value with a registered code, a second
    /// round trip is field-for-field stable:
    /// serialize(deserialize(serialize(e))) == serialize(e).
    #[test]
    fn serialize_round_trip_is_stable(
        code_idx in 0usize..3,
        reason in "[a-z ]{0,32}",
        with_details in any::<bool>(),
    ) {
        let engine = engine();
        let code = ["auth.invalid_token", "auth.rate_limited", "billing.retry_later"][code_idx];

        let err = if with_details {
            engine.create_with(code, json!({"reason": reason})).unwrap()
        } else {
            engine.create(code).unwrap()
        };

        let first = engine.serialize(&err);
        let second = engine.serialize(&engine.deserialize(&first));
        prop_assert_eq!(first, second);
    }

    /// The wire record carries `details` iff the value is exposed.
    #[test]
    fn details_present_iff_exposed(expose in any::<bool>(), n in any::<u32>()) {
        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! {
                "probe" => CodeEntry::new("Probe").with_expose(expose),
            })
            .build();

        let err = engine.create_with("probe", json!({"n": n})).unwrap();
        let record = engine.serialize(&err);
        prop_assert_eq!(record.details.is_some(), expose);
    }

    /// JSON round trip through text preserves the record exactly.
    #[test]
    fn wire_record_survives_json_text(reason in "[a-z]{0,16}") {
        let engine = engine();
        let err = engine
            .create_with("auth.invalid_token", json!({"reason": reason}))
            .unwrap();
        let record = engine.serialize(&err);

        let text = serde_json::to_string(&record).unwrap();
        let parsed: SerializedRecord = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(record, parsed);
    }

    /// Forged records claiming the catch-all id are always hardened.
    #[test]
    fn forged_catch_all_records_are_hardened(
        message in "\\PC{0,32}",
        tags in prop::collection::vec("[a-z]{1,8}", 0..4),
    ) {
        let engine = engine();
        let forged = SerializedRecord {
            brand: BRAND.to_owned(),
            app: None,
            code: relay_errors::CATCH_ALL_CODE.to_owned(),
            message,
            status: Some(200),
            retryable: Some(true),
            log_level: None,
            tags: Some(tags),
            details: Some(json!({"sneaky": true})),
        };

        let value = engine.deserialize(&forged);
        prop_assert!(!value.is_exposed());
        prop_assert!(value.tags().is_empty());

        // The client mirror applies the same tag hardening.
        let client = engine.deserialize_client(&forged);
        prop_assert!(client.tags().is_empty());
    }

    /// Deserialization never fails, whatever fields a branded record is
    /// missing.
    #[test]
    fn deserialize_is_total_for_sparse_records(code in "[a-z.]{0,24}") {
        let engine = engine();
        let record = SerializedRecord {
            brand: BRAND.to_owned(),
            app: None,
            code,
            message: String::new(),
            status: None,
            retryable: None,
            log_level: None,
            tags: None,
            details: None,
        };

        let value = engine.deserialize(&record);
        // Unregistered codes fall back to the bare code string (or the
        // engine default when even the code is empty).
        prop_assert_eq!(value.status(), 500);
    }
}

// ============================================================================
// MATCHER PROPERTIES
// ============================================================================

proptest! {
    /// An exact candidate always beats every wildcard.
    #[test]
    fn exact_match_always_wins(segment in "[a-z]{1,8}") {
        let code = format!("auth.{segment}");
        let candidates = [code.clone(), "auth.*".to_owned()];
        prop_assert_eq!(
            relay_errors::matcher::best_match(&code, &candidates),
            Some(code.as_str())
        );
    }

    /// A wildcard covers exactly the codes sharing its dotted prefix.
    #[test]
    fn wildcard_covers_prefix_only(
        ns in "[a-z]{1,8}",
        other in "[a-z]{1,8}",
        leaf in "[a-z]{1,8}",
    ) {
        prop_assume!(ns != other);
        let pattern = format!("{ns}.*");
        let ns_code = format!("{ns}.{leaf}");
        let other_code = format!("{other}.{leaf}");
        prop_assert!(relay_errors::matcher::matches(&ns_code, &pattern));
        prop_assert!(!relay_errors::matcher::matches(&other_code, &pattern));
    }

    /// The winner never depends on candidate order (ties excluded by
    /// construction: prefixes of distinct lengths).
    #[test]
    fn best_match_is_order_independent(leaf in "[a-z]{1,8}") {
        let code = format!("auth.tokens.{leaf}");
        let forward = ["auth.*".to_owned(), "auth.tokens.*".to_owned()];
        let backward = ["auth.tokens.*".to_owned(), "auth.*".to_owned()];
        prop_assert_eq!(
            relay_errors::matcher::best_match(&code, &forward),
            relay_errors::matcher::best_match(&code, &backward)
        );
    }
}

// ============================================================================
// DIAGNOSTICS BOUNDS
// ============================================================================

proptest! {
    /// The diagnostics ring never exceeds its capacity and counts every
    /// eviction.
    #[test]
    fn diagnostics_ring_stays_bounded(
        capacity in 1usize..64,
        events in 0usize..128,
    ) {
        use relay_errors::diagnostics::{DiagnosticOrigin, DiagnosticsChannel};

        let channel = DiagnosticsChannel::new(capacity);
        for i in 0..events {
            channel.warn(DiagnosticOrigin::Registry, format!("event {i}"));
        }

        prop_assert!(channel.len() <= capacity);
        if events >= capacity {
            prop_assert_eq!(channel.len(), capacity);
            prop_assert_eq!(channel.eviction_count(), (events - capacity) as u64);
        } else {
            prop_assert_eq!(channel.len(), events);
            prop_assert_eq!(channel.eviction_count(), 0);
        }
    }

    /// Plugin faults never leak out of the pipeline, whatever the hook
    /// panics with.
    #[test]
    fn hook_panics_stay_contained(payload in "\\PC{0,64}") {
        use relay_errors::Plugin;

        let engine = Engine::builder()
            .capture_stack(false)
            .codes(codes! { "c" => CodeEntry::new("m") })
            .plugin(Plugin::new("chaos").on_create(move |_, _| panic!("{payload}")))
            .build();

        let err = engine.create("c").unwrap();
        prop_assert_eq!(err.code(), "c");
        prop_assert_eq!(engine.diagnostics().len(), 1);
    }
}
