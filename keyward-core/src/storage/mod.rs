//! Credential storage contract.
//!
//! The application owns the schema; the core only needs:
//! - lookup by credential id (ids are unique system-wide),
//! - lookup of every credential of a user handle,
//! - atomic check-and-insert,
//! - atomic counter compare-and-set.

mod memory;
mod pending;

pub use memory::MemoryCredentialStore;
pub use pending::PendingCeremonies;

use async_trait::async_trait;

use crate::credential::CredentialRecord;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Credential id already exists")]
    Duplicate,

    #[error("Credential not found")]
    NotFound,

    #[error("Counter changed concurrently (current value {current})")]
    Conflict { current: u32 },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_id(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StorageError>;

    async fn get_all_for_user(&self, user_handle: &[u8]) -> Result<Vec<CredentialRecord>, StorageError>;

    /// Insert a new record. Fails with [`StorageError::Duplicate`] if the id exists.
    async fn insert(&self, record: CredentialRecord) -> Result<(), StorageError>;

    /// Set the counter to `new` only if it still equals `expected`.
    ///
    /// Fails with [`StorageError::NotFound`] if the record vanished and with
    /// [`StorageError::Conflict`] if another update won.
    async fn update_counter(
        &self,
        credential_id: &[u8],
        expected: u32,
        new: u32,
    ) -> Result<(), StorageError>;
}
