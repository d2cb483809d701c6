//! chatvault-crypto: client-side envelope encryption for chat content and
//! share packages.
//!
//! Key hierarchy:
//! ```text
//! User Master Key (256-bit random, persisted on-device, fingerprinted)
//!   └── DEK (per record, 256-bit random, wrapped by UMK)
//!       └── Content AEAD: XChaCha20-Poly1305 (nonce=random_192bit,
//!           AAD={"chat_id","user_id","v"})
//!
//! Share Key (per share, 256-bit random, distributed out of band)
//!   └── Payload AEAD: XChaCha20-Poly1305 (AAD={"share_id","v"})
//! ```
//!
//! All binary fields travel as URL-safe unpadded base64. The UMK itself is
//! owned by `chatvault-keystore`; this crate is pure and never persists.

pub mod aad;
pub mod chat;
pub mod encoding;
pub mod keys;
pub mod provider;
pub mod recovery;
pub mod share;

pub use chat::{decrypt_chat_content, encrypt_chat_content, EncV1, WrappedDek};
pub use encoding::{from_url_safe_base64, to_url_safe_base64};
pub use keys::{fingerprint, AeadKey, ShareKey, UserMasterKey};
pub use provider::{CryptoProvider, XChaCha20Provider};
#[cfg(any(test, feature = "testutil"))]
pub use provider::DeterministicProvider;
pub use recovery::{key_from_mnemonic, key_from_recovery_text, recovery_key_text, recovery_mnemonic};
pub use share::{
    decrypt_share_payload, encrypt_share_payload, generate_share_key, import_share_key, ShareEncV1,
};

/// Envelope label for the single supported AEAD suite (JOSE name).
pub const ALGORITHM: &str = "XC20P";

/// Size of every key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
