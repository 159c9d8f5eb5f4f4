use std::thread;

use crate::{init_json_telemetry, init_telemetry, service_name, service_span};

// The only test touching the global subscriber, so the install order is known.
#[test]
fn concurrent_initialisation_installs_once() {
    let names = ["svc-0", "svc-1", "svc-2", "svc-3", "svc-4", "svc-5"];
    let handles: Vec<_> = names.iter().copied().map(|name| thread::spawn(move || init_telemetry(name))).collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let installed = service_name().unwrap();
    assert!(names.contains(&installed));

    init_telemetry("other").unwrap();
    init_json_telemetry("other-json").unwrap();
    assert_eq!(service_name(), Some(installed));

    let span = service_span();
    // Disabled when RUST_LOG filters out info spans.
    if let Some(metadata) = span.metadata() {
        assert!(metadata.fields().field("service.name").is_some());
    }
    let _root = span.entered();
    tracing::info!(quiz.id = "q-1", "event after init");
}
