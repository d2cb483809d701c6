//! AEAD primitive adapter.
//!
//! Everything above [`CryptoProvider`] is pure envelope logic. Two
//! implementations exist:
//!
//! - [`XChaCha20Provider`]: production, XChaCha20-Poly1305 with `OsRng` nonces
//! - `DeterministicProvider` (feature `testutil`): same AEAD, seeded RNG,
//!   counts AEAD calls
//!
//! Authentication failures always surface as `VaultError::DecryptionFailed`,
//! distinct from every other error.

#[cfg(any(test, feature = "testutil"))]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(any(test, feature = "testutil"))]
use std::sync::{Mutex, PoisonError};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
#[cfg(any(test, feature = "testutil"))]
use rand::{rngs::StdRng, SeedableRng};
use sha2::{Digest, Sha256};

use chatvault_core::{VaultError, VaultResult};

use crate::keys::AeadKey;
use crate::{ALGORITHM, KEY_SIZE, NONCE_SIZE};

/// Contract over the cryptographic primitives the envelopes need.
pub trait CryptoProvider: Send + Sync {
    /// Label written into the `alg` / `k_alg` envelope fields.
    fn algorithm(&self) -> &'static str;

    /// Fill `buf` from a cryptographically secure source.
    fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()>;

    /// AEAD encrypt. Output is ciphertext with the tag appended.
    fn seal(&self, key: &AeadKey, nonce: &[u8], aad: &[u8], plaintext: &[u8])
        -> VaultResult<Vec<u8>>;

    /// AEAD decrypt. Any authentication failure is `DecryptionFailed`.
    fn open(&self, key: &AeadKey, nonce: &[u8], aad: &[u8], ciphertext: &[u8])
        -> VaultResult<Vec<u8>>;

    /// Digest used for key fingerprints.
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    fn nonce_len(&self) -> usize {
        NONCE_SIZE
    }

    fn generate_key(&self) -> VaultResult<AeadKey> {
        let mut bytes = [0u8; KEY_SIZE];
        self.fill_random(&mut bytes)?;
        let key = AeadKey::from_bytes(bytes);
        zeroize::Zeroize::zeroize(&mut bytes);
        Ok(key)
    }

    /// A fresh random nonce. Never derived from a counter.
    fn random_nonce(&self) -> VaultResult<Vec<u8>> {
        let mut nonce = vec![0u8; self.nonce_len()];
        self.fill_random(&mut nonce)?;
        Ok(nonce)
    }

    fn import_raw(&self, raw: &[u8]) -> VaultResult<AeadKey> {
        AeadKey::from_slice(raw)
    }
}

/// Production provider: XChaCha20-Poly1305, SHA-256, `OsRng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaCha20Provider;

impl XChaCha20Provider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for XChaCha20Provider {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| VaultError::Encryption(format!("secure random unavailable: {e}")))
    }

    fn seal(
        &self,
        key: &AeadKey,
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Vec<u8>> {
        xchacha_seal(key, nonce, aad, plaintext)
    }

    fn open(
        &self,
        key: &AeadKey,
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> VaultResult<Vec<u8>> {
        xchacha_open(key, nonce, aad, ciphertext)
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

/// Test provider: identical AEAD, but keys and nonces come from a seeded
/// `StdRng`, so two providers with the same seed produce identical envelopes.
///
/// Counts `seal`/`open` calls so tests can assert that no cryptographic work
/// happened (e.g. when a version check rejects a payload).
///
/// Not for production use: every key it generates is predictable from the
/// seed. Only compiled with the `testutil` feature.
#[cfg(any(test, feature = "testutil"))]
#[derive(Debug)]
pub struct DeterministicProvider {
    rng: Mutex<StdRng>,
    aead_calls: AtomicUsize,
}

#[cfg(any(test, feature = "testutil"))]
impl DeterministicProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            aead_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `seal` + `open` calls made so far.
    pub fn aead_calls(&self) -> usize {
        self.aead_calls.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testutil"))]
impl CryptoProvider for DeterministicProvider {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()> {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(buf);
        Ok(())
    }

    fn seal(
        &self,
        key: &AeadKey,
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Vec<u8>> {
        self.aead_calls.fetch_add(1, Ordering::SeqCst);
        xchacha_seal(key, nonce, aad, plaintext)
    }

    fn open(
        &self,
        key: &AeadKey,
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> VaultResult<Vec<u8>> {
        self.aead_calls.fetch_add(1, Ordering::SeqCst);
        xchacha_open(key, nonce, aad, ciphertext)
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

fn xchacha_seal(key: &AeadKey, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::Encryption(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| VaultError::Encryption(e.to_string()))
}

fn xchacha_open(
    key: &AeadKey,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> VaultResult<Vec<u8>> {
    // A malformed nonce is indistinguishable from tampering to the caller.
    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::DecryptionFailed);
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::DecryptionFailed)
}
