#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const CLI_ERROR: &str = "CLI_ERROR";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const BUSY: &str = "BUSY";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const SIGNING: &str = "SIGNING";
    pub const GENERATION: &str = "GENERATION";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum PaygenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Malformed signer result at {url}: {reason}")]
    MalformedResult { url: String, reason: String },

    #[error("Timed out after {timeout_secs}s waiting for condition")]
    PollTimeout { timeout_secs: u64 },

    #[error("Image signing timed out: {0}")]
    SigningTimeout(String),

    #[error("Signing failed: {}", .results.join(", "))]
    SigningFailed { results: Vec<String> },

    #[error("Board not configured for payloads: {0}")]
    BoardNotConfigured(String),

    #[error("Missing push image instructions: {0}")]
    MissingInstructions(String),

    #[error("Test lab scheduling failed: {0}")]
    TestLabFailure(String),

    #[error("Payload generation failed: {}", .failures.join("; "))]
    GenerationFailed { failures: Vec<String> },

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaygenError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::SerializationError(_) | Self::MalformedResult { .. } => {
                code::INVALID
            }
            Self::IoError(_) => code::DEPENDENCY,
            Self::PollTimeout { .. } | Self::SigningTimeout(_) => code::TIMEOUT,
            Self::SigningFailed { .. } => code::SIGNING,
            Self::BoardNotConfigured(_) | Self::MissingInstructions(_) => code::NOTFOUND,
            Self::TestLabFailure(_) => code::BUSY,
            Self::GenerationFailed { .. } => code::GENERATION,
            Self::ChannelError(_) => code::CONFLICT,
            Self::Internal(_) => code::INTERNAL,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::IoError(_) => 3,
            Self::SerializationError(_) | Self::MalformedResult { .. } => 4,
            Self::PollTimeout { .. } | Self::SigningTimeout(_) => 5,
            Self::SigningFailed { .. } => 6,
            Self::GenerationFailed { .. } => 7,
            Self::BoardNotConfigured(_) | Self::MissingInstructions(_) => 8,
            Self::TestLabFailure(_) => 10,
            Self::ChannelError(_) => 11,
            Self::Internal(_) => 9,
        }
    }
}

/// Protocol error codes as documented in the CLI
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::CLI_ERROR,
        "Invalid CLI usage",
        "Run 'paygen --help' for valid options",
    ),
    (
        code::NOTFOUND,
        "Board config or upstream instructions were not found",
        "Check the release config and the push-image stage output",
    ),
    (
        code::INVALID,
        "Invalid configuration or payload",
        "Validate config values and JSON syntax",
    ),
    (
        code::CONFLICT,
        "Inconsistent channel bookkeeping",
        "Inspect the instruction map for duplicated channels",
    ),
    (
        code::BUSY,
        "Test lab could not schedule payload tests",
        "Retry once lab capacity is available",
    ),
    (
        code::DEPENDENCY,
        "Content store or external program unavailable",
        "Verify the content root and generator command",
    ),
    (
        code::TIMEOUT,
        "Signing did not finish in time",
        "Inspect signer output or raise the signing timeout",
    ),
    (
        code::SIGNING,
        "One or more channels failed signing",
        "Inspect the listed signer results per channel",
    ),
    (
        code::GENERATION,
        "Payload generation failed for one or more channels",
        "Inspect generator logs for the listed channels",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry command",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, PaygenError>;

#[cfg(test)]
mod tests {
    use super::{get_error_info, PaygenError, ERROR_CODES};

    #[test]
    fn signing_failed_lists_results_comma_separated() {
        let err = PaygenError::SigningFailed {
            results: vec![
                "beta-channel.json".to_string(),
                "stable-channel.json".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Signing failed: beta-channel.json, stable-channel.json"
        );
    }

    #[test]
    fn every_variant_code_is_documented() {
        let errors = [
            PaygenError::ConfigError("x".to_string()),
            PaygenError::PollTimeout { timeout_secs: 1 },
            PaygenError::SigningFailed { results: vec![] },
            PaygenError::BoardNotConfigured("x".to_string()),
            PaygenError::TestLabFailure("x".to_string()),
            PaygenError::GenerationFailed { failures: vec![] },
            PaygenError::ChannelError("x".to_string()),
            PaygenError::Internal("x".to_string()),
        ];
        for err in errors {
            assert!(get_error_info(err.code()).is_some(), "{err:?}");
        }
        assert!(ERROR_CODES.len() >= 10);
    }
}
