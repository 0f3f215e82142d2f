#![no_main]

//! Fuzz target for attestation object decoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_attestation_object

use keyward_core::cbor::DecodeLimits;
use keyward_core::AttestationObject;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = AttestationObject::parse(data, DecodeLimits::default());
});
