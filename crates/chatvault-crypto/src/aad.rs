//! Context binding and version gating shared by both envelope families.
//!
//! AAD is the compact JSON of a fixed-order struct, e.g.
//! ```text
//! {"chat_id":"C","user_id":"U","v":1}
//! {"share_id":"S","v":1}
//! ```
//! It is always rebuilt from caller-supplied ids at decrypt time; the `aad`
//! field stored in a record is informational only.

use serde::Serialize;
use serde_json::Value;

use chatvault_core::{PayloadKind, VaultError, VaultResult, ENVELOPE_VERSION};

#[derive(Serialize)]
struct ChatContext<'a> {
    chat_id: &'a str,
    user_id: &'a str,
    v: u32,
}

#[derive(Serialize)]
struct ShareContext<'a> {
    share_id: &'a str,
    v: u32,
}

/// Canonical AAD bytes binding chat content to `(chat_id, user_id, v)`.
pub fn chat_aad(chat_id: &str, user_id: &str) -> VaultResult<Vec<u8>> {
    serde_json::to_vec(&ChatContext {
        chat_id,
        user_id,
        v: ENVELOPE_VERSION,
    })
    .map_err(|e| VaultError::Serialization(format!("chat aad: {e}")))
}

/// Canonical AAD bytes binding a share package to `(share_id, v)`.
pub fn share_aad(share_id: &str) -> VaultResult<Vec<u8>> {
    serde_json::to_vec(&ShareContext {
        share_id,
        v: ENVELOPE_VERSION,
    })
    .map_err(|e| VaultError::Serialization(format!("share aad: {e}")))
}

/// Reject anything whose `v` is not exactly the supported version,
/// including `null` payloads and records without a `v` field.
pub(crate) fn check_version(value: &Value, kind: PayloadKind) -> VaultResult<()> {
    match value.get("v").and_then(Value::as_u64) {
        Some(v) if v == u64::from(ENVELOPE_VERSION) => Ok(()),
        _ => Err(VaultError::unsupported(kind)),
    }
}
