use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix every channel carries once handed to payload generation.
pub const CHANNEL_SUFFIX: &str = "-channel";

/// Suffix turning a signer instruction URL into its result URL.
pub const RESULT_SUFFIX: &str = ".json";

/// A release track such as `stable` or `beta`, or any trybot-supplied name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Channel name as the generator expects it, always ending in `-channel`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        if self.0.ends_with(CHANNEL_SUFFIX) {
            self.clone()
        } else {
            Self(format!("{}{CHANNEL_SUFFIX}", self.0))
        }
    }

    /// Channel name without the `-channel` suffix.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.strip_suffix(CHANNEL_SUFFIX).unwrap_or(&self.0)
    }

    /// True when both names address the same release track.
    #[must_use]
    pub fn same_track(&self, other: &Self) -> bool {
        self.short_name() == other.short_name()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Locator of one signer instruction artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionUrl(String);

impl InstructionUrl {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Location of the signer's verdict for this instruction.
    #[must_use]
    pub fn result_url(&self) -> String {
        format!("{}{RESULT_SUFFIX}", self.0)
    }

    /// Last path segment of the result URL, used to identify a result in
    /// failure reports.
    #[must_use]
    pub fn result_basename(&self) -> String {
        let result_url = self.result_url();
        url::Url::parse(&result_url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| {
                result_url
                    .rsplit('/')
                    .next()
                    .map_or_else(|| result_url.clone(), str::to_string)
            })
    }
}

impl fmt::Display for InstructionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstructionUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, InstructionUrl};

    #[test]
    fn normalized_appends_suffix_once() {
        assert_eq!(Channel::new("stable").normalized().value(), "stable-channel");
        assert_eq!(
            Channel::new("beta-channel").normalized().value(),
            "beta-channel"
        );
        assert_eq!(Channel::new("canary").short_name(), "canary");
        assert!(Channel::new("dev").same_track(&Channel::new("dev-channel")));
    }

    #[test]
    fn result_url_and_basename_follow_suffix_convention() {
        let url = InstructionUrl::new(
            "gs://chromeos-releases/stable-channel/link/1.2.3/payloads/signing/u3.instructions",
        );
        assert_eq!(
            url.result_url(),
            "gs://chromeos-releases/stable-channel/link/1.2.3/payloads/signing/u3.instructions.json"
        );
        assert_eq!(url.result_basename(), "u3.instructions.json");
    }

    #[test]
    fn basename_of_plain_path_falls_back_to_last_segment() {
        let url = InstructionUrl::new("signing/beta-channel");
        assert_eq!(url.result_basename(), "beta-channel.json");

        let bare = InstructionUrl::new("u2");
        assert_eq!(bare.result_basename(), "u2.json");
    }
}
