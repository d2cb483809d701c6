//! In-process key store.
//!
//! Nothing survives a restart. The availability switch lets callers (mostly
//! tests) simulate a store outage without touching real storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use chatvault_core::{VaultError, VaultResult};

use crate::KeyStore;

#[derive(Debug)]
pub struct MemoryKeyStore {
    records: Mutex<HashMap<String, Zeroizing<String>>>,
    available: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable, every `get`/`put` fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> VaultResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::StoreUnavailable("memory store offline".into()))
        }
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, name: &str) -> VaultResult<Option<SecretString>> {
        self.check_available()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(name)
            .map(|record| SecretString::from(record.as_str().to_owned())))
    }

    async fn put(&self, name: &str, record: SecretString) -> VaultResult<()> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_owned(),
                Zeroizing::new(record.expose_secret().to_owned()),
            );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = MemoryKeyStore::new();
        assert!(store.get("umk").await.unwrap().is_none());

        store.put("umk", SecretString::from("a")).await.unwrap();
        store.put("umk", SecretString::from("b")).await.unwrap();

        assert_eq!(store.get("umk").await.unwrap().unwrap().expose_secret(), "b");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryKeyStore::new();
        store.put("umk", SecretString::from("a")).await.unwrap();
        store.set_available(false);

        assert!(matches!(
            store.get("umk").await,
            Err(VaultError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.put("umk", SecretString::from("b")).await,
            Err(VaultError::StoreUnavailable(_))
        ));

        store.set_available(true);
        assert_eq!(store.get("umk").await.unwrap().unwrap().expose_secret(), "a");
    }
}
