//! Recovery key rendering
//!
//! The recovery key is the raw user master key, so importing it reproduces
//! the exact same fingerprint. Two interchangeable text forms:
//! - URL-safe base64 of the 32 raw bytes (43 chars)
//! - 24-word BIP-39 mnemonic with the raw bytes as entropy (no KDF)

use bip39::Mnemonic;
use secrecy::SecretString;
use zeroize::Zeroizing;

use chatvault_core::{VaultError, VaultResult};

use crate::encoding::{from_url_safe_base64, to_url_safe_base64};
use crate::keys::AeadKey;
use crate::provider::CryptoProvider;

/// Export a key as recovery text (base64 form).
pub fn recovery_key_text(key: &AeadKey) -> SecretString {
    SecretString::from(to_url_safe_base64(key.as_bytes()))
}

/// Import a key from recovery text (base64 form).
pub fn key_from_recovery_text<P: CryptoProvider + ?Sized>(
    provider: &P,
    text: &str,
) -> VaultResult<AeadKey> {
    let raw = Zeroizing::new(from_url_safe_base64(text.trim())?);
    provider.import_raw(&raw)
}

/// Export a key as a 24-word BIP-39 mnemonic.
pub fn recovery_mnemonic(key: &AeadKey) -> VaultResult<SecretString> {
    let mnemonic = Mnemonic::from_entropy(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("BIP-39 mnemonic generation failed: {e}")))?;
    Ok(SecretString::from(mnemonic.to_string()))
}

/// Import a key from a 24-word BIP-39 mnemonic.
pub fn key_from_mnemonic<P: CryptoProvider + ?Sized>(
    provider: &P,
    words: &str,
) -> VaultResult<AeadKey> {
    let mnemonic: Mnemonic = words
        .trim()
        .parse()
        .map_err(|e| VaultError::InvalidEncoding(format!("invalid BIP-39 mnemonic: {e}")))?;
    let entropy = Zeroizing::new(mnemonic.to_entropy());
    provider.import_raw(&entropy)
}
