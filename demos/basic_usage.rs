//! Basic usage: declare a registry, create values, normalize strays.

use relay_errors::{codes, CodeEntry, Engine, LogLevel};
use serde_json::json;

fn main() {
    let engine = Engine::builder()
        .app("payments-api")
        .env("local")
        .codes(codes! {
            "auth" => {
                "invalid_token" => CodeEntry::new("Invalid or expired token")
                    .with_status(401)
                    .with_level(LogLevel::Warn)
                    .with_tag("auth"),
            },
            "billing" => {
                "retry_later" => CodeEntry::templated("Retry after {retryAfter}s")
                    .with_details(json!({"retryAfter": 45}))
                    .with_retryable(true),
            },
        })
        .build();

    // A registered failure with explicit details.
    let err = engine
        .create_with("auth.invalid_token", json!({"reason": "expired"}))
        .unwrap();
    println!("domain error : {err}");
    println!("  status     : {}", err.status());
    println!("  tags       : {:?}", err.tags());

    // The template picks up the entry's default details.
    let err = engine.create("billing.retry_later").unwrap();
    println!("templated    : {err}");

    // Anything else is normalized, never dropped.
    let stray = engine.ensure(std::io::Error::other("connection reset"));
    println!("normalized   : {stray}");
    println!("  catch-all? : {}", stray.is_catch_all());

    // The safe wrapper hands failures back already normalized.
    let result: relay_errors::Result<u32> = engine.safe(|| {
        "not a number"
            .parse::<u32>()
            .map_err(relay_errors::Unknown::from_error)
    });
    match result {
        Ok(n) => println!("parsed       : {n}"),
        Err(e) => println!("safe         : {e}"),
    }
}
