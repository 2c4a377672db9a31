#![no_main]

use c2pa_manifest::ManifestStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes as a manifest store must never panic,
    // only return errors
    if let Ok(store) = ManifestStore::from_jumbf_bytes(data) {
        // Walk the parsed structure - these should all be safe
        let _ = store.active_manifest();
        for manifest in store.manifests() {
            let _ = manifest.claim();
            let _ = manifest.signature();
            for assertion in manifest.assertion_store().iter() {
                let _ = assertion.full_label();
                let _ = assertion.bytes();
            }
            let _ = manifest.bytes();
        }
        // Re-emission of an unmutated parse must succeed
        let _ = store.to_jumbf_bytes();
    }
});
