pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{PayloadKind, ENVELOPE_VERSION};
