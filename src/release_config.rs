//! Release configuration: which boards get payloads, on which channels.
//!
//! The document follows the paygen.json layout: a `delta` list of entries,
//! each naming a board and a channel, plus an optional `boards` list of
//! boards that are configured but may have no payload entries.

use crate::error::{PaygenError, Result};
use crate::types::Channel;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub public_codename: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub board: BoardInfo,
    pub channel: Channel,
    #[serde(default)]
    pub delta_type: Option<String>,
    #[serde(default)]
    pub chrome_os_version: Option<String>,
    #[serde(default)]
    pub generate_delta: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub delta: Vec<ReleaseEntry>,
    #[serde(default)]
    pub boards: Vec<BoardInfo>,
}

impl ReleaseConfig {
    /// Parse a release config document.
    ///
    /// # Errors
    /// Returns `PaygenError::SerializationError` for invalid JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a release config document from disk.
    ///
    /// # Errors
    /// Returns `PaygenError::ConfigError` if the file cannot be read, or
    /// `PaygenError::SerializationError` for invalid JSON.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            PaygenError::ConfigError(format!(
                "Failed to read release config {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Entries for `board`, optionally narrowed to one channel.
    ///
    /// `stable` and `stable-channel` address the same entries.
    #[must_use]
    pub fn entries(&self, board: &str, channel: Option<&Channel>) -> Vec<&ReleaseEntry> {
        self.delta
            .iter()
            .filter(|entry| entry.board.public_codename == board)
            .filter(|entry| channel.is_none_or(|wanted| entry.channel.same_track(wanted)))
            .collect()
    }

    #[must_use]
    pub fn knows_board(&self, board: &str) -> bool {
        self.boards.iter().any(|info| info.public_codename == board)
            || self
                .delta
                .iter()
                .any(|entry| entry.board.public_codename == board)
    }

    /// # Errors
    /// Returns `PaygenError::BoardNotConfigured` when `board` has no release
    /// configuration at all.
    pub fn validate_board(&self, board: &str) -> Result<()> {
        if self.knows_board(board) {
            Ok(())
        } else {
            Err(PaygenError::BoardNotConfigured(format!(
                "No release config entry for board {board}"
            )))
        }
    }
}
