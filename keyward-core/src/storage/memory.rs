//! In-memory credential store
//!
//! Suitable for development and tests; records are lost on restart.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CredentialStore, StorageError};
use crate::credential::CredentialRecord;

/// DashMap-backed [`CredentialStore`]. Entry-level locking gives atomic
/// insert and compare-and-set.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<Vec<u8>, CredentialRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_by_id(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StorageError> {
        Ok(self
            .credentials
            .get(credential_id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_all_for_user(&self, user_handle: &[u8]) -> Result<Vec<CredentialRecord>, StorageError> {
        Ok(self
            .credentials
            .iter()
            .filter(|entry| entry.value().user_handle == user_handle)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert(&self, record: CredentialRecord) -> Result<(), StorageError> {
        match self.credentials.entry(record.credential_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn update_counter(
        &self,
        credential_id: &[u8],
        expected: u32,
        new: u32,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .credentials
            .get_mut(credential_id)
            .ok_or(StorageError::NotFound)?;
        if entry.sign_count != expected {
            return Err(StorageError::Conflict {
                current: entry.sign_count,
            });
        }
        entry.sign_count = new;
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
