use serde::{Deserialize, Serialize};

/// The only envelope version this crate reads or writes.
pub const ENVELOPE_VERSION: u32 = 1;

/// Which envelope family a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Chat content wrapped under the user master key
    Chat,
    /// Standalone share package
    Share,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Chat => f.write_str("chat"),
            PayloadKind::Share => f.write_str("share"),
        }
    }
}
