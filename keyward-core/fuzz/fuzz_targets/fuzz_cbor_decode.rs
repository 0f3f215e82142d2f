#![no_main]

//! Fuzz target for the strict CBOR decoder.
//!
//! Arbitrary bytes must decode or fail with a `CborError`, never panic or
//! recurse past the depth limit. Successful decodes are fed to the COSE key
//! parser as well.
//!
//! Run with: cargo +nightly fuzz run fuzz_cbor_decode

use keyward_core::cbor;
use keyward_core::CoseKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = cbor::decode(data) {
        let _ = CoseKey::from_value(&value);
    }
});
