//! Share package envelope (`ShareEncV1`)
//!
//! A single AEAD layer under a standalone share key, bound to
//! `{"share_id":..,"v":1}`. The user master key is never involved, so a
//! recipient only needs the package and the exported key text.

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use chatvault_core::{PayloadKind, VaultError, VaultResult, ENVELOPE_VERSION};

use crate::aad::{check_version, share_aad};
use crate::chat::sealed_field;
use crate::encoding::{from_url_safe_base64, to_url_safe_base64};
use crate::keys::ShareKey;
use crate::provider::CryptoProvider;

/// Versioned share record, embedded by the caller into a shareable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEncV1 {
    pub v: u32,
    pub alg: String,
    pub iv: String,
    pub ct: String,
    pub aad: String,
}

impl ShareEncV1 {
    /// Parse an untyped record, checking the version before anything else.
    pub fn from_value(value: &Value) -> VaultResult<Self> {
        check_version(value, PayloadKind::Share)?;
        Self::deserialize(value)
            .map_err(|e| VaultError::Serialization(format!("share package: {e}")))
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| VaultError::Serialization(format!("share package: {e}")))?;
        Self::from_value(&value)
    }

    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VaultError::Serialization(format!("share package: {e}")))
    }
}

/// Generate a share key and its exported text form.
pub fn generate_share_key<P: CryptoProvider + ?Sized>(
    provider: &P,
) -> VaultResult<(ShareKey, SecretString)> {
    let key = ShareKey::new(provider.generate_key()?);
    let text = key.export();
    Ok((key, text))
}

/// Import a share key from its exported text.
pub fn import_share_key<P: CryptoProvider + ?Sized>(
    provider: &P,
    exported: &str,
) -> VaultResult<ShareKey> {
    let raw = Zeroizing::new(from_url_safe_base64(exported.trim())?);
    Ok(ShareKey::new(provider.import_raw(&raw)?))
}

/// Encrypt `payload` under `share_key`, bound to `share_id`.
pub fn encrypt_share_payload<P, T>(
    provider: &P,
    share_key: &ShareKey,
    share_id: &str,
    payload: &T,
) -> VaultResult<ShareEncV1>
where
    P: CryptoProvider + ?Sized,
    T: Serialize + ?Sized,
{
    let aad = share_aad(share_id)?;
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload)
            .map_err(|e| VaultError::Serialization(format!("share payload: {e}")))?,
    );
    let iv = provider.random_nonce()?;
    let ct = provider.seal(share_key.key(), &iv, &aad, &plaintext)?;

    tracing::debug!(share_id, bytes = plaintext.len(), "encrypted share payload");

    Ok(ShareEncV1 {
        v: ENVELOPE_VERSION,
        alg: provider.algorithm().to_string(),
        iv: to_url_safe_base64(&iv),
        ct: to_url_safe_base64(&ct),
        aad: to_url_safe_base64(&aad),
    })
}

/// Decrypt a share package for `share_id`. Same failure semantics as chat
/// content: version first, then `DecryptionFailed` for any AEAD problem.
pub fn decrypt_share_payload<P, T>(
    provider: &P,
    share_key: &ShareKey,
    pkg: &ShareEncV1,
    share_id: &str,
) -> VaultResult<T>
where
    P: CryptoProvider + ?Sized,
    T: DeserializeOwned,
{
    if pkg.v != ENVELOPE_VERSION || pkg.alg != provider.algorithm() {
        return Err(VaultError::unsupported(PayloadKind::Share));
    }

    let aad = share_aad(share_id)?;
    let iv = sealed_field(&pkg.iv)?;
    let ct = sealed_field(&pkg.ct)?;
    let plaintext = Zeroizing::new(provider.open(share_key.key(), &iv, &aad, &ct)?);

    tracing::debug!(share_id, bytes = plaintext.len(), "decrypted share payload");

    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Serialization(format!("share payload: {e}")))
}
