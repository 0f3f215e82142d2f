#![no_main]

//! Fuzz target for `AuthenticatorData::parse`.
//!
//! Run with: cargo +nightly fuzz run fuzz_authenticator_data

use keyward_core::AuthenticatorData;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(auth_data) = AuthenticatorData::parse(data) {
        // A successful parse keeps the exact input bytes for signature checks.
        assert_eq!(auth_data.raw, data);
    }
});
