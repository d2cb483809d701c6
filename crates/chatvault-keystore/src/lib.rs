//! chatvault-keystore: persistence and lifecycle of the user master key
//!
//! Backends (selected by `[keystore] backend` in chatvault.toml):
//!   - file      one JSON record per name under `dir` (default)
//!   - keychain  platform keychain via the `keyring` crate
//!   - memory    process memory only
//!
//! [`KeyManager`] sits on top of any backend and owns UMK creation,
//! fingerprint self-heal, session-only fallback and recovery import/export.

pub mod file;
pub mod keychain;
pub mod manager;
pub mod memory;

pub use file::FileKeyStore;
pub use keychain::KeychainKeyStore;
pub use manager::{Durability, KeyManager, UmkOrigin, UmkStatus};
pub use memory::MemoryKeyStore;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use chatvault_core::config::{KeyStoreBackend, KeyStoreConfig};
use chatvault_core::VaultResult;

/// Named-record store for key material.
///
/// Backends report any failure to reach the underlying storage as
/// `VaultError::StoreUnavailable`; a missing record is `Ok(None)`.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, name: &str) -> VaultResult<Option<SecretString>>;
    async fn put(&self, name: &str, record: SecretString) -> VaultResult<()>;
}

/// Build the backend selected by `config`.
pub fn open_keystore(config: &KeyStoreConfig) -> VaultResult<Arc<dyn KeyStore>> {
    let store: Arc<dyn KeyStore> = match config.backend {
        KeyStoreBackend::File => Arc::new(FileKeyStore::new(config.resolved_dir())),
        KeyStoreBackend::Keychain => Arc::new(KeychainKeyStore::open(&config.service_name)?),
        KeyStoreBackend::Memory => Arc::new(MemoryKeyStore::new()),
    };
    tracing::debug!(backend = ?config.backend, "opened key store");
    Ok(store)
}
