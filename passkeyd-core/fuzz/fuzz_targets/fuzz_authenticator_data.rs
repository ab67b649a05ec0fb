#![no_main]

//! Fuzz target for AuthenticatorData::parse()
//!
//! Authenticator data arrives verbatim from the client on every ceremony.
//!
//! Run with: cargo +nightly fuzz run fuzz_authenticator_data

use libfuzzer_sys::fuzz_target;
use passkeyd_core::crypto::{AuthenticatorData, CoseKey};

fuzz_target!(|data: &[u8]| {
    // Must never panic, only return errors
    let _ = AuthenticatorData::parse(data);
    let _ = CoseKey::from_cbor(data);
});
