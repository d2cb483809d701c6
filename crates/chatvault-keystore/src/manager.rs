//! User master key lifecycle.
//!
//! ```text
//! ABSENT ──create──▶ VALID ──fingerprint mismatch──▶ VALID (record rewritten)
//!   any  ──import──▶ VALID (new identity)
//! ```
//!
//! Persisted record (`StoredUmk`, JSON):
//! ```text
//! {"v":1,"key":"<b64url raw key>","fingerprint":"<b64url sha256>","created_at":<unix secs>}
//! ```
//!
//! A record that exists but cannot be parsed is never replaced implicitly:
//! `get_or_create_umk` returns `UnreadableKeyRecord` and the caller decides
//! between `replace_unreadable_umk` and `import_recovery_key`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use chatvault_core::config::KeyStoreConfig;
use chatvault_core::{VaultError, VaultResult};
use chatvault_crypto::{
    key_from_mnemonic, key_from_recovery_text, recovery_key_text, recovery_mnemonic, AeadKey,
    CryptoProvider, UserMasterKey,
};

use crate::{open_keystore, KeyStore};

const RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredUmk {
    v: u32,
    key: String,
    fingerprint: String,
    created_at: u64,
}

/// How the returned key came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmkOrigin {
    /// Read from the store as-is
    Loaded,
    /// Freshly generated on this call
    Created,
    /// Read from the store; its stale fingerprint was rewritten
    Healed,
    /// Reused from this manager's memory: a session-only key, a key another
    /// call is creating concurrently, or the last known key while the store
    /// is unreachable
    Session,
}

/// Whether the key survives a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Durability {
    Persisted,
    /// The store was unreachable; the key lives only in this manager.
    /// Content encrypted under it is lost when the process exits unless the
    /// store recovers (the key is then persisted) or a recovery key is saved.
    SessionOnly { reason: String },
}

#[derive(Debug, Clone)]
pub struct UmkStatus {
    pub key: UserMasterKey,
    pub origin: UmkOrigin,
    pub durability: Durability,
}

impl UmkStatus {
    pub fn is_persisted(&self) -> bool {
        self.durability == Durability::Persisted
    }
}

/// The key this manager hands out when the store has nothing better.
#[derive(Clone)]
struct CurrentUmk {
    umk: UserMasterKey,
    created_at: u64,
    persisted: bool,
}

/// Owns the user master key. Construct once and pass by reference.
///
/// Calls on one manager never create two different keys: the first key
/// generated is kept in memory and every concurrent creator persists that
/// same key. Separate managers over one store are not coordinated.
pub struct KeyManager {
    provider: Arc<dyn CryptoProvider>,
    store: Arc<dyn KeyStore>,
    record_name: String,
    current: Mutex<Option<CurrentUmk>>,
}

impl KeyManager {
    pub fn new(
        provider: Arc<dyn CryptoProvider>,
        store: Arc<dyn KeyStore>,
        record_name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            record_name: record_name.into(),
            current: Mutex::new(None),
        }
    }

    /// Build a manager over the backend selected in `config`.
    pub fn from_config(
        config: &KeyStoreConfig,
        provider: Arc<dyn CryptoProvider>,
    ) -> VaultResult<Self> {
        let store = open_keystore(config)?;
        Ok(Self::new(provider, store, config.record_name.clone()))
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        self.provider.as_ref()
    }

    /// Return the current UMK, creating and persisting one if none exists.
    pub async fn get_or_create_umk(&self) -> VaultResult<UmkStatus> {
        match self.store.get(&self.record_name).await {
            Ok(Some(record)) => self.load_record(&record).await,
            Ok(None) => self.create().await,
            Err(VaultError::StoreUnavailable(reason)) => {
                tracing::warn!(%reason, "key store unavailable while loading UMK");
                self.fallback(reason)
            }
            Err(e) => Err(e),
        }
    }

    /// Fingerprint of the current UMK.
    pub async fn fingerprint(&self) -> VaultResult<String> {
        Ok(self.get_or_create_umk().await?.key.fingerprint().to_owned())
    }

    /// Raw export of the current UMK as recovery text.
    pub async fn export_recovery_key(&self) -> VaultResult<SecretString> {
        let status = self.get_or_create_umk().await?;
        Ok(recovery_key_text(status.key.key()))
    }

    /// The current UMK as a 24-word BIP-39 mnemonic.
    pub async fn export_recovery_mnemonic(&self) -> VaultResult<SecretString> {
        let status = self.get_or_create_umk().await?;
        recovery_mnemonic(status.key.key())
    }

    /// Import a recovery key and overwrite the stored record unconditionally.
    ///
    /// Destructive: content wrapped under a different previous UMK becomes
    /// unreadable. Returns the new fingerprint.
    pub async fn import_recovery_key(&self, text: &str) -> VaultResult<String> {
        let key = key_from_recovery_text(self.provider(), text)?;
        self.install(key).await
    }

    /// Mnemonic counterpart of [`KeyManager::import_recovery_key`].
    pub async fn import_recovery_mnemonic(&self, words: &str) -> VaultResult<String> {
        let key = key_from_mnemonic(self.provider(), words)?;
        self.install(key).await
    }

    /// Confirmed replacement of an unreadable record with a fresh key.
    ///
    /// If the stored record turns out to be readable it is kept and returned
    /// unchanged, so this can never discard a working key.
    pub async fn replace_unreadable_umk(&self) -> VaultResult<UmkStatus> {
        if let Some(record) = self.store.get(&self.record_name).await? {
            if self.parse_record(&record).is_ok() {
                tracing::info!("stored UMK record is readable, keeping it");
                return self.load_record(&record).await;
            }
        }

        let umk = UserMasterKey::new(self.provider(), self.provider.generate_key()?);
        let created_at = now_secs();
        self.persist(&umk, created_at).await?;
        self.set_current(&umk, created_at, true);
        tracing::warn!(
            fingerprint = umk.short_fingerprint(),
            "replaced unreadable UMK record; content wrapped under the old key is lost"
        );
        Ok(UmkStatus {
            key: umk,
            origin: UmkOrigin::Created,
            durability: Durability::Persisted,
        })
    }

    async fn load_record(&self, record: &SecretString) -> VaultResult<UmkStatus> {
        let (umk, stored) = self
            .parse_record(record)
            .map_err(|reason| VaultError::UnreadableKeyRecord { reason })?;

        let mut origin = UmkOrigin::Loaded;
        if stored.fingerprint != umk.fingerprint() {
            tracing::warn!(
                stored = short(&stored.fingerprint),
                actual = umk.short_fingerprint(),
                "UMK fingerprint mismatch, rewriting record"
            );
            // Idempotent for a fixed key, so a failed or racing rewrite is
            // simply retried on the next load.
            match self.persist(&umk, stored.created_at).await {
                Ok(()) => origin = UmkOrigin::Healed,
                Err(e) => tracing::warn!("UMK fingerprint self-heal failed: {e}"),
            }
        }

        if let Some(previous) = self.set_current(&umk, stored.created_at, true) {
            if !previous.persisted && previous.umk.fingerprint() != umk.fingerprint() {
                tracing::warn!(
                    discarded = previous.umk.short_fingerprint(),
                    "store holds a UMK record; discarding session-only key"
                );
            }
        }

        Ok(UmkStatus {
            key: umk,
            origin,
            durability: Durability::Persisted,
        })
    }

    async fn create(&self) -> VaultResult<UmkStatus> {
        let (current, origin) = self.claim_current()?;

        match self.persist(&current.umk, current.created_at).await {
            Ok(()) => {
                self.mark_persisted(&current.umk);
                match origin {
                    UmkOrigin::Created => tracing::info!(
                        fingerprint = current.umk.short_fingerprint(),
                        "created UMK"
                    ),
                    _ if !current.persisted => tracing::info!(
                        fingerprint = current.umk.short_fingerprint(),
                        "persisted session-only UMK"
                    ),
                    _ => tracing::debug!(
                        fingerprint = current.umk.short_fingerprint(),
                        "rewrote missing UMK record"
                    ),
                }
                Ok(UmkStatus {
                    key: current.umk,
                    origin,
                    durability: Durability::Persisted,
                })
            }
            Err(VaultError::StoreUnavailable(reason)) => {
                tracing::warn!(%reason, "key store unavailable while persisting UMK");
                Ok(self.in_memory_status(current, origin, reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Store unreachable: hand out the key this manager already holds, or a
    /// new session-only one.
    fn fallback(&self, reason: String) -> VaultResult<UmkStatus> {
        let (current, origin) = self.claim_current()?;
        Ok(self.in_memory_status(current, origin, reason))
    }

    fn in_memory_status(&self, current: CurrentUmk, origin: UmkOrigin, reason: String) -> UmkStatus {
        let durability = if current.persisted {
            Durability::Persisted
        } else {
            if origin == UmkOrigin::Created {
                tracing::warn!(
                    fingerprint = current.umk.short_fingerprint(),
                    "using session-only UMK; it will not survive a restart"
                );
            }
            Durability::SessionOnly { reason }
        };
        UmkStatus {
            key: current.umk,
            origin,
            durability,
        }
    }

    /// The key in memory, or a freshly generated one placed there. Taken
    /// under the lock, so concurrent creators all end up with one key.
    fn claim_current(&self) -> VaultResult<(CurrentUmk, UmkOrigin)> {
        let mut slot = self.lock_current();
        if let Some(current) = slot.as_ref() {
            return Ok((current.clone(), UmkOrigin::Session));
        }
        let current = CurrentUmk {
            umk: UserMasterKey::new(self.provider(), self.provider.generate_key()?),
            created_at: now_secs(),
            persisted: false,
        };
        *slot = Some(current.clone());
        Ok((current, UmkOrigin::Created))
    }

    fn mark_persisted(&self, umk: &UserMasterKey) {
        if let Some(current) = self.lock_current().as_mut() {
            if current.umk.fingerprint() == umk.fingerprint() {
                current.persisted = true;
            }
        }
    }

    /// Replace the in-memory key, returning the previous one.
    fn set_current(
        &self,
        umk: &UserMasterKey,
        created_at: u64,
        persisted: bool,
    ) -> Option<CurrentUmk> {
        self.lock_current().replace(CurrentUmk {
            umk: umk.clone(),
            created_at,
            persisted,
        })
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<CurrentUmk>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn install(&self, key: AeadKey) -> VaultResult<String> {
        let umk = UserMasterKey::new(self.provider(), key);
        let created_at = now_secs();
        self.persist(&umk, created_at).await?;
        self.set_current(&umk, created_at, true);
        tracing::info!(
            fingerprint = umk.short_fingerprint(),
            "imported recovery key, previous UMK replaced"
        );
        Ok(umk.fingerprint().to_owned())
    }

    async fn persist(&self, umk: &UserMasterKey, created_at: u64) -> VaultResult<()> {
        let stored = StoredUmk {
            v: RECORD_VERSION,
            key: recovery_key_text(umk.key()).expose_secret().to_owned(),
            fingerprint: umk.fingerprint().to_owned(),
            created_at,
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| VaultError::Serialization(format!("UMK record: {e}")))?;
        self.store
            .put(&self.record_name, SecretString::from(json))
            .await
    }

    fn parse_record(&self, record: &SecretString) -> Result<(UserMasterKey, StoredUmk), String> {
        let stored: StoredUmk = serde_json::from_str(record.expose_secret())
            .map_err(|e| format!("parsing UMK record: {e}"))?;
        if stored.v != RECORD_VERSION {
            return Err(format!("unsupported UMK record version {}", stored.v));
        }
        let key = key_from_recovery_text(self.provider(), &stored.key)
            .map_err(|e| format!("importing UMK: {e}"))?;
        Ok((UserMasterKey::new(self.provider(), key), stored))
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("record_name", &self.record_name)
            .finish_non_exhaustive()
    }
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(8)]
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
