#![no_main]

//! Fuzz target for AttestationObject parsing and statement verification
//!
//! Run with: cargo +nightly fuzz run fuzz_attestation_object

use libfuzzer_sys::fuzz_target;
use passkeyd_core::crypto::AttestationObject;

fuzz_target!(|data: &[u8]| {
    if let Ok(object) = AttestationObject::from_cbor(data) {
        let _ = object.verify(&[0u8; 32]);
    }
});
