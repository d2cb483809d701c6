//! Chat content envelope (`EncV1`)
//!
//! Two AEAD layers sharing one AAD:
//! ```text
//! DEK  = fresh 256-bit key per call
//! AAD  = {"chat_id":..,"user_id":..,"v":1}
//! dek_wrap = AEAD(UMK, nonce_w, AAD, DEK)
//! ct       = AEAD(DEK, nonce_c, AAD, json(content))
//! ```
//! Binding both layers to the same AAD means a record moved to another chat
//! or user fails authentication at the first layer it reaches.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use chatvault_core::{PayloadKind, VaultError, VaultResult, ENVELOPE_VERSION};

use crate::aad::{chat_aad, check_version};
use crate::encoding::{from_url_safe_base64, to_url_safe_base64};
use crate::keys::UserMasterKey;
use crate::provider::CryptoProvider;

/// The DEK, encrypted under the user master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedDek {
    pub iv: String,
    pub ct: String,
}

/// Versioned chat content record. Persisted by the caller next to the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncV1 {
    pub v: u32,
    /// Content AEAD
    pub alg: String,
    /// DEK wrapping AEAD
    pub k_alg: String,
    pub iv: String,
    pub ct: String,
    pub dek_wrap: WrappedDek,
    /// Encoded AAD. Informational: decryption rebuilds it from caller ids.
    pub aad: String,
}

impl EncV1 {
    /// Parse an untyped record, checking the version before anything else.
    pub fn from_value(value: &Value) -> VaultResult<Self> {
        check_version(value, PayloadKind::Chat)?;
        Self::deserialize(value)
            .map_err(|e| VaultError::Serialization(format!("chat envelope: {e}")))
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| VaultError::Serialization(format!("chat envelope: {e}")))?;
        Self::from_value(&value)
    }

    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VaultError::Serialization(format!("chat envelope: {e}")))
    }
}

/// Encrypt `content` for `(chat_id, user_id)` under a fresh DEK wrapped by `umk`.
///
/// Pure: nothing is persisted. The DEK is zeroized before returning.
pub fn encrypt_chat_content<P, T>(
    provider: &P,
    umk: &UserMasterKey,
    chat_id: &str,
    user_id: &str,
    content: &T,
) -> VaultResult<EncV1>
where
    P: CryptoProvider + ?Sized,
    T: Serialize + ?Sized,
{
    let dek = provider.generate_key()?;
    let aad = chat_aad(chat_id, user_id)?;

    let wrap_iv = provider.random_nonce()?;
    let wrap_ct = provider.seal(umk.key(), &wrap_iv, &aad, dek.as_bytes())?;

    let plaintext = Zeroizing::new(
        serde_json::to_vec(content)
            .map_err(|e| VaultError::Serialization(format!("chat content: {e}")))?,
    );
    let iv = provider.random_nonce()?;
    let ct = provider.seal(&dek, &iv, &aad, &plaintext)?;
    drop(dek);

    tracing::debug!(
        chat_id,
        umk = umk.short_fingerprint(),
        bytes = plaintext.len(),
        "encrypted chat content"
    );

    Ok(EncV1 {
        v: ENVELOPE_VERSION,
        alg: provider.algorithm().to_string(),
        k_alg: provider.algorithm().to_string(),
        iv: to_url_safe_base64(&iv),
        ct: to_url_safe_base64(&ct),
        dek_wrap: WrappedDek {
            iv: to_url_safe_base64(&wrap_iv),
            ct: to_url_safe_base64(&wrap_ct),
        },
        aad: to_url_safe_base64(&aad),
    })
}

/// Decrypt an `EncV1` record for `(chat_id, user_id)`.
///
/// Version and algorithm are checked before any AEAD call. Every
/// authentication problem (wrong UMK, wrong ids, tampered field) is
/// `DecryptionFailed`, whichever layer detects it.
pub fn decrypt_chat_content<P, T>(
    provider: &P,
    umk: &UserMasterKey,
    env: &EncV1,
    chat_id: &str,
    user_id: &str,
) -> VaultResult<T>
where
    P: CryptoProvider + ?Sized,
    T: DeserializeOwned,
{
    if env.v != ENVELOPE_VERSION
        || env.alg != provider.algorithm()
        || env.k_alg != provider.algorithm()
    {
        return Err(VaultError::unsupported(PayloadKind::Chat));
    }

    let aad = chat_aad(chat_id, user_id)?;

    let wrap_iv = sealed_field(&env.dek_wrap.iv)?;
    let wrap_ct = sealed_field(&env.dek_wrap.ct)?;
    let raw_dek = Zeroizing::new(provider.open(umk.key(), &wrap_iv, &aad, &wrap_ct)?);
    let dek = provider
        .import_raw(&raw_dek)
        .map_err(|_| VaultError::DecryptionFailed)?;

    let iv = sealed_field(&env.iv)?;
    let ct = sealed_field(&env.ct)?;
    let plaintext = Zeroizing::new(provider.open(&dek, &iv, &aad, &ct)?);
    drop(dek);

    tracing::debug!(
        chat_id,
        umk = umk.short_fingerprint(),
        bytes = plaintext.len(),
        "decrypted chat content"
    );

    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Serialization(format!("chat content: {e}")))
}

/// Decode a binary envelope field. A field that does not decode is treated
/// as tampering, not as a parse error.
pub(crate) fn sealed_field(text: &str) -> VaultResult<Vec<u8>> {
    from_url_safe_base64(text).map_err(|_| VaultError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::AeadKey;
    use crate::provider::{DeterministicProvider, XChaCha20Provider};
    use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
    use serde_json::json;

    fn test_umk(provider: &dyn CryptoProvider) -> UserMasterKey {
        UserMasterKey::new(provider, AeadKey::from_bytes([42u8; KEY_SIZE]))
    }

    fn sample_content() -> Value {
        json!({
            "messages": [{"role": "user", "content": "hello"}],
            "history": {"currentId": "x"}
        })
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let content = sample_content();

        let env = encrypt_chat_content(&provider, &umk, "C", "U", &content).unwrap();
        let decrypted: Value = decrypt_chat_content(&provider, &umk, &env, "C", "U").unwrap();

        assert_eq!(decrypted, content);
    }

    #[test]
    fn test_record_shape() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);

        let env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        assert_eq!(env.v, 1);
        assert_eq!(env.alg, "XC20P");
        assert_eq!(env.k_alg, "XC20P");
        assert_eq!(from_url_safe_base64(&env.iv).unwrap().len(), NONCE_SIZE);
        assert_eq!(
            from_url_safe_base64(&env.dek_wrap.ct).unwrap().len(),
            KEY_SIZE + TAG_SIZE
        );
        assert_eq!(
            from_url_safe_base64(&env.aad).unwrap(),
            chat_aad("C", "U").unwrap()
        );

        let value = serde_json::to_value(&env).unwrap();
        for field in ["v", "alg", "k_alg", "iv", "ct", "dek_wrap", "aad"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert!(value["dek_wrap"].get("iv").is_some());
        assert!(value["dek_wrap"].get("ct").is_some());
    }

    #[test]
    fn test_fresh_nonces_and_dek_per_call() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let content = sample_content();

        let a = encrypt_chat_content(&provider, &umk, "C", "U", &content).unwrap();
        let b = encrypt_chat_content(&provider, &umk, "C", "U", &content).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.dek_wrap.iv, b.dek_wrap.iv);
        assert_ne!(a.ct, b.ct);
        assert_ne!(a.dek_wrap.ct, b.dek_wrap.ct, "each call must use a new DEK");
    }

    #[test]
    fn test_wrong_chat_id() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C2", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_user_id() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U2").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_umk() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let other = UserMasterKey::new(&provider, AeadKey::from_bytes([1u8; KEY_SIZE]));
        let env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let err = decrypt_chat_content::<_, Value>(&provider, &other, &env, "C", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_aad_field_is_ignored_for_authorization() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        // Claiming a different context in the record does not unlock it elsewhere
        env.aad = to_url_safe_base64(&chat_aad("C2", "U").unwrap());
        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C2", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));

        // ...and the original ids still work, since the stored aad is not trusted
        let ok: Value = decrypt_chat_content(&provider, &umk, &env, "C", "U").unwrap();
        assert_eq!(ok, sample_content());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let mut ct = from_url_safe_base64(&env.ct).unwrap();
        ct[0] ^= 0xFF;
        env.ct = to_url_safe_base64(&ct);

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_wrapped_dek() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let mut wrapped = from_url_safe_base64(&env.dek_wrap.ct).unwrap();
        wrapped[3] ^= 0x01;
        env.dek_wrap.ct = to_url_safe_base64(&wrapped);

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_undecodable_field_is_decryption_failure() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();
        env.iv = "***".into();

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn test_version_checked_before_aead() {
        let provider = DeterministicProvider::new(3);
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();
        let calls_after_encrypt = provider.aead_calls();

        env.v = 2;
        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U").unwrap_err();

        assert_eq!(err.to_string(), "Unsupported encrypted chat payload");
        assert_eq!(provider.aead_calls(), calls_after_encrypt, "no AEAD call allowed");
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let mut env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();
        env.alg = "A256GCM".into();

        let err = decrypt_chat_content::<_, Value>(&provider, &umk, &env, "C", "U").unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedPayload { .. }));
    }

    #[test]
    fn test_from_value_rejects_null_and_v2() {
        for bad in [json!(null), json!({"v": 2}), json!({"alg": "XC20P"})] {
            let err = EncV1::from_value(&bad).unwrap_err();
            assert_eq!(err.to_string(), "Unsupported encrypted chat payload");
        }
    }

    #[test]
    fn test_json_roundtrip_then_decrypt() {
        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let env = encrypt_chat_content(&provider, &umk, "C", "U", &sample_content()).unwrap();

        let stored = env.to_json().unwrap();
        let loaded = EncV1::from_json(&stored).unwrap();
        assert_eq!(loaded, env);

        let decrypted: Value = decrypt_chat_content(&provider, &umk, &loaded, "C", "U").unwrap();
        assert_eq!(decrypted, sample_content());
    }

    #[test]
    fn test_from_value_missing_fields_after_version() {
        let err = EncV1::from_value(&json!({"v": 1})).unwrap_err();
        assert!(matches!(err, VaultError::Serialization(_)));
    }

    #[test]
    fn test_typed_content_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Note {
            title: String,
            pinned: bool,
        }

        let provider = XChaCha20Provider::new();
        let umk = test_umk(&provider);
        let note = Note {
            title: "groceries".into(),
            pinned: true,
        };

        let env = encrypt_chat_content(&provider, &umk, "chat-1", "user-1", &note).unwrap();
        let back: Note = decrypt_chat_content(&provider, &umk, &env, "chat-1", "user-1").unwrap();
        assert_eq!(back, note);
    }
}
