//! Security event hook.
//!
//! Counter regressions and duplicate registrations are the two failure
//! patterns that point at cloned authenticators or replay. They are reported
//! here in addition to the returned error so deployments can alert on them.

use tracing::{info, warn};

use crate::base64url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    CounterRegression {
        credential_id: Vec<u8>,
        stored: u32,
        presented: u32,
    },
    DuplicateRegistration {
        credential_id: Vec<u8>,
    },
    /// Both counters were zero: accepted, with weaker clone detection.
    CounterUnsupported {
        credential_id: Vec<u8>,
    },
}

pub trait CeremonyObserver: Send + Sync {
    fn on_event(&self, event: &SecurityEvent);
}

/// Default observer: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CeremonyObserver for TracingObserver {
    fn on_event(&self, event: &SecurityEvent) {
        match event {
            SecurityEvent::CounterRegression {
                credential_id,
                stored,
                presented,
            } => warn!(
                credential_id = %base64url::encode(credential_id),
                stored,
                presented,
                "Signature counter regression, possible cloned authenticator"
            ),
            SecurityEvent::DuplicateRegistration { credential_id } => warn!(
                credential_id = %base64url::encode(credential_id),
                "Registration attempted with an existing credential id"
            ),
            SecurityEvent::CounterUnsupported { credential_id } => info!(
                credential_id = %base64url::encode(credential_id),
                "Authenticator does not implement a signature counter"
            ),
        }
    }
}
