//! Platform keychain key store.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)
//!
//! Keychain calls can block on IPC, so they run on the blocking pool.
//!
//! [`KeychainKeyStore::open`] refuses credential stores that do not keep
//! what was written (keyring's in-memory mock, used when no platform backend
//! is compiled in), since a UMK written there is gone on the next read.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use chatvault_core::{VaultError, VaultResult};

use crate::KeyStore;

const CHECK_NAME: &str = "__chatvault_check__";

#[derive(Debug, Clone)]
pub struct KeychainKeyStore {
    service: String,
}

impl KeychainKeyStore {
    /// Open the platform keychain for `service`.
    ///
    /// Writes a check credential and reads it back through a fresh entry;
    /// fails with `StoreUnavailable` if it does not come back. Blocks on
    /// keychain IPC.
    pub fn open(service: &str) -> VaultResult<Self> {
        verify_persistence(service)?;
        Ok(Self {
            service: service.to_owned(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

fn verify_persistence(service: &str) -> VaultResult<()> {
    entry(service, CHECK_NAME)?
        .set_password(CHECK_NAME)
        .map_err(|e| VaultError::StoreUnavailable(format!("keychain check write: {e}")))?;

    let readback = entry(service, CHECK_NAME)?.get_password();
    if let Ok(check) = entry(service, CHECK_NAME) {
        let _ = check.delete_credential();
    }

    match readback {
        Ok(value) if value == CHECK_NAME => Ok(()),
        Ok(_) | Err(keyring::Error::NoEntry) => Err(VaultError::StoreUnavailable(
            "keychain backend does not persist credentials".into(),
        )),
        Err(e) => Err(VaultError::StoreUnavailable(format!(
            "keychain check read: {e}"
        ))),
    }
}

fn entry(service: &str, name: &str) -> VaultResult<keyring::Entry> {
    keyring::Entry::new(service, name)
        .map_err(|e| VaultError::StoreUnavailable(format!("keychain entry creation: {e}")))
}

fn get_blocking(service: &str, name: &str) -> VaultResult<Option<SecretString>> {
    match entry(service, name)?.get_password() {
        Ok(mut password) => {
            let secret = SecretString::from(password.clone());
            password.zeroize();
            Ok(Some(secret))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(VaultError::StoreUnavailable(format!(
            "keychain get for '{name}': {e}"
        ))),
    }
}

fn put_blocking(service: &str, name: &str, record: &SecretString) -> VaultResult<()> {
    entry(service, name)?
        .set_password(record.expose_secret())
        .map_err(|e| VaultError::StoreUnavailable(format!("keychain store for '{name}': {e}")))?;
    tracing::debug!(key = name, "stored record in platform keychain");
    Ok(())
}

#[async_trait]
impl KeyStore for KeychainKeyStore {
    async fn get(&self, name: &str) -> VaultResult<Option<SecretString>> {
        let service = self.service.clone();
        let name = name.to_owned();
        tokio::task::spawn_blocking(move || get_blocking(&service, &name))
            .await
            .map_err(|e| VaultError::StoreUnavailable(format!("keychain task: {e}")))?
    }

    async fn put(&self, name: &str, record: SecretString) -> VaultResult<()> {
        let service = self.service.clone();
        let name = name.to_owned();
        tokio::task::spawn_blocking(move || put_blocking(&service, &name, &record))
            .await
            .map_err(|e| VaultError::StoreUnavailable(format!("keychain task: {e}")))?
    }
}
