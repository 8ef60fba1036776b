//! Boundary round trip: producer serializes, JSON crosses the wire, the
//! consumer reconstructs - full value on one side, client mirror on the
//! other.

use relay_errors::{codes, CodeEntry, Engine, SerializedRecord};
use serde_json::json;

fn registry() -> relay_errors::CodeMap {
    codes! {
        "auth" => {
            "invalid_token" => CodeEntry::new("Invalid or expired token")
                .with_status(401)
                .with_expose(true)
                .with_tag("auth"),
        },
    }
}

fn main() {
    // Producer process.
    let producer = Engine::builder()
        .app("gateway")
        .env("prod") // never serialized
        .codes(registry())
        .build();

    let err = producer
        .create_with("auth.invalid_token", json!({"reason": "expired"}))
        .unwrap();
    let wire = serde_json::to_string_pretty(&producer.serialize(&err)).unwrap();
    println!("--- on the wire ---\n{wire}\n");

    // Consumer process, sharing only the code declarations.
    let consumer = Engine::builder().app("frontend-bff").codes(registry()).build();

    let record: SerializedRecord = serde_json::from_str(&wire).unwrap();
    let full = consumer.deserialize(&record);
    println!("full value   : {full}");
    println!("  details    : {:?}", full.details());
    println!("  env        : {:?} (never crossed)", full.env());

    let client = consumer.deserialize_client(&record);
    println!("client error : {client}");
    println!("  retryable  : {}", client.is_retryable());
    println!("  routes to  : {:?}", client.code_matches("auth.*"));

    // An http-shaped projection of an arbitrary failure.
    let response = consumer.http_from_with("session store timeout", "auth.invalid_token");
    println!("http status  : {}", response.status);
}
