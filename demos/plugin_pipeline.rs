//! Plugin pipeline: contributed codes, unknown-mapping, creation
//! observers and wire adaptation, with fault isolation on display.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_errors::{codes, CodeEntry, Engine, Plugin, UnknownOutcome};

fn main() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);

    let engine = Engine::builder()
        .app("worker")
        .codes(codes! {
            "job" => { "failed" => CodeEntry::new("Job failed") },
        })
        // Contributes codes and claims connection failures.
        .plugin(
            Plugin::new("io-mapper")
                .with_codes(codes! {
                    "io" => {
                        "unavailable" => CodeEntry::new("Backend unavailable")
                            .with_status(503)
                            .with_retryable(true),
                    },
                })
                .on_unknown(|raw, _ctx| {
                    raw.render()
                        .contains("connection refused")
                        .then(|| UnknownOutcome::mapped("io.unavailable"))
                }),
        )
        // Counts every value birth.
        .plugin(Plugin::new("census").on_create(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        // Stamps outgoing records.
        .plugin(Plugin::new("stamper").on_serialize(|mut record, _, _| {
            record.app = Some("worker-eu-1".to_owned());
            record
        }))
        // A broken observer, to show fault isolation.
        .plugin(Plugin::new("chaos").on_create(|_, _| panic!("observer bug")))
        .build();

    let mapped = engine.ensure("dial tcp: connection refused");
    println!("mapped       : {mapped}");
    println!("  status     : {}", mapped.status());

    let unmapped = engine.ensure(42.to_string());
    println!("unmapped     : {unmapped}");

    let record = engine.serialize(&mapped);
    println!("stamped app  : {:?}", record.app);

    println!("values born  : {}", created.load(Ordering::SeqCst));
    println!("diagnostics  :");
    for d in engine.diagnostics().all() {
        println!("  [{}] {}: {}", d.severity, d.origin, d.message);
    }
}
