//! Key material: the raw AEAD key type plus the two long-lived roles built on
//! it (user master key, share key). DEKs are plain `AeadKey`s that never
//! leave the envelope functions.

use secrecy::SecretString;
use zeroize::Zeroize;

use chatvault_core::{VaultError, VaultResult};

use crate::encoding::to_url_safe_base64;
use crate::provider::CryptoProvider;
use crate::KEY_SIZE;

/// A 256-bit AEAD key. Zeroized on drop.
#[derive(Clone)]
pub struct AeadKey {
    bytes: [u8; KEY_SIZE],
}

impl AeadKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Import raw key bytes, rejecting anything that is not exactly 32 bytes.
    pub fn from_slice(raw: &[u8]) -> VaultResult<Self> {
        if raw.len() != KEY_SIZE {
            return Err(VaultError::InvalidKey {
                expected: KEY_SIZE,
                actual: raw.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }

    /// Raw export. Avoid logging or persisting the returned bytes directly.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Fingerprint of a key: provider digest of the raw bytes, URL-safe base64.
pub fn fingerprint<P: CryptoProvider + ?Sized>(provider: &P, key: &AeadKey) -> String {
    to_url_safe_base64(&provider.digest(key.as_bytes()))
}

/// The long-lived user master key together with its fingerprint.
#[derive(Clone)]
pub struct UserMasterKey {
    key: AeadKey,
    fingerprint: String,
}

impl UserMasterKey {
    /// Wrap `key`, computing its fingerprint with `provider`.
    pub fn new<P: CryptoProvider + ?Sized>(provider: &P, key: AeadKey) -> Self {
        let fingerprint = fingerprint(provider, &key);
        Self { key, fingerprint }
    }

    pub fn key(&self) -> &AeadKey {
        &self.key
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// First 8 characters of the fingerprint, for log lines.
    pub fn short_fingerprint(&self) -> &str {
        let end = self.fingerprint.len().min(8);
        &self.fingerprint[..end]
    }
}

impl std::fmt::Debug for UserMasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMasterKey")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// A standalone key for one share package. Possession is the only
/// authorization needed to decrypt; this crate never stores it.
#[derive(Clone, Debug)]
pub struct ShareKey {
    key: AeadKey,
}

impl ShareKey {
    pub fn new(key: AeadKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &AeadKey {
        &self.key
    }

    /// Text form for out-of-band distribution (e.g. a link fragment).
    pub fn export(&self) -> SecretString {
        SecretString::from(to_url_safe_base64(self.key.as_bytes()))
    }
}
