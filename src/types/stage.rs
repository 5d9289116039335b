use serde::{Deserialize, Serialize};
use std::fmt;

/// Where one channel stands in its signing lifecycle.
///
/// `Successful` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPhase {
    Pending,
    Fetching { collected: usize, expected: usize },
    Successful,
    Failed,
}

impl ChannelPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching { .. } => "fetching",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching {
                collected,
                expected,
            } => write!(f, "fetching ({collected}/{expected})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// How a stage run obtained its channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Wait for signer results, generate per channel as each one passes.
    Signed,
    /// Channels supplied by the caller, no signing wait.
    Explicit,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Explicit => "explicit",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
