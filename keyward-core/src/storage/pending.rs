//! In-memory store for issued ceremony options
//!
//! Each issued options value may be verified exactly once: `take_*` removes it.
//! Entries expire after the timeout embedded in the options.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::ceremony::options::{CreationOptions, RequestOptions};

struct Entry<T> {
    options: T,
    expires_at: Instant,
}

/// Pending registration and authentication options, keyed by an
/// application-chosen ceremony id (e.g. a session identifier).
#[derive(Default)]
pub struct PendingCeremonies {
    registrations: DashMap<String, Entry<CreationOptions>>,
    authentications: DashMap<String, Entry<RequestOptions>>,
}

impl PendingCeremonies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store registration options; a previous entry under the same id is replaced.
    pub fn store_registration(&self, ceremony_id: impl Into<String>, options: CreationOptions) {
        let expires_at = Instant::now() + Duration::from_millis(options.timeout);
        self.registrations
            .insert(ceremony_id.into(), Entry { options, expires_at });
    }

    /// Retrieve and remove registration options
    pub fn take_registration(&self, ceremony_id: &str) -> Option<CreationOptions> {
        let (_, entry) = self.registrations.remove(ceremony_id)?;
        (entry.expires_at > Instant::now()).then_some(entry.options)
    }

    pub fn store_authentication(&self, ceremony_id: impl Into<String>, options: RequestOptions) {
        let expires_at = Instant::now() + Duration::from_millis(options.timeout);
        self.authentications
            .insert(ceremony_id.into(), Entry { options, expires_at });
    }

    /// Retrieve and remove authentication options
    pub fn take_authentication(&self, ceremony_id: &str) -> Option<RequestOptions> {
        let (_, entry) = self.authentications.remove(ceremony_id)?;
        (entry.expires_at > Instant::now()).then_some(entry.options)
    }

    /// Remove expired entries (called periodically)
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.registrations.retain(|_, entry| entry.expires_at > now);
        self.authentications.retain(|_, entry| entry.expires_at > now);
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn authentication_count(&self) -> usize {
        self.authentications.len()
    }
}

impl std::fmt::Debug for PendingCeremonies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCeremonies")
            .field("registrations", &self.registrations.len())
            .field("authentications", &self.authentications.len())
            .finish()
    }
}
