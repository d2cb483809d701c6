//! URL-safe, padding-less base64 for every binary field in the wire records.
//!
//! Encoding always emits the canonical form (`-`/`_`, no `=`). Decoding
//! accepts the canonical form first, then falls back to padded input and the
//! standard `+`/`/` alphabet so records written by older encoders still load.

use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use chatvault_core::{VaultError, VaultResult};

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn to_url_safe_base64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn from_url_safe_base64(text: &str) -> VaultResult<Vec<u8>> {
    match URL_SAFE_NO_PAD.decode(text) {
        Ok(bytes) => Ok(bytes),
        Err(canonical_err) => LENIENT_URL_SAFE
            .decode(text)
            .or_else(|_| LENIENT_STANDARD.decode(text))
            .map_err(|_| VaultError::InvalidEncoding(format!("base64: {canonical_err}"))),
    }
}
