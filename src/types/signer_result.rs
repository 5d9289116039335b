use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const SIGNER_STATUS_PASSED: &str = "passed";
pub const SIGNER_STATUS_FAILED: &str = "failed";

/// Verdict carried in `status.status` of a signer result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerStatus {
    Passed,
    Failed,
    InProgress(String),
}

impl SignerStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            SIGNER_STATUS_PASSED => Self::Passed,
            SIGNER_STATUS_FAILED => Self::Failed,
            other => Self::InProgress(other.to_string()),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Passed => SIGNER_STATUS_PASSED,
            Self::Failed => SIGNER_STATUS_FAILED,
            Self::InProgress(raw) => raw,
        }
    }
}

impl fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inner `status` object of a signer result document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlock {
    pub status: Option<String>,
}

/// Parsed signer result: `{"status": {"status": "<passed|failed|other>"}}`.
///
/// Every level is optional. Anything missing, or of an unexpected JSON type,
/// reads as "no status yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerResult {
    pub status: Option<StatusBlock>,
}

impl SignerResult {
    #[must_use]
    pub fn with_status(status: &str) -> Self {
        Self {
            status: Some(StatusBlock {
                status: Some(status.to_string()),
            }),
        }
    }

    #[must_use]
    pub fn from_value(document: &Value) -> Self {
        let status = document
            .get("status")
            .and_then(Value::as_object)
            .map(|block| StatusBlock {
                status: block
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        Self { status }
    }

    #[must_use]
    pub fn status(&self) -> Option<SignerStatus> {
        self.status
            .as_ref()
            .and_then(|block| block.status.as_deref())
            .map(SignerStatus::parse)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status().is_some_and(|status| status.is_completed())
    }

    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status() == Some(SignerStatus::Passed)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status() == Some(SignerStatus::Failed)
    }
}
