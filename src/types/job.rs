use super::Channel;
use serde::{Deserialize, Serialize};

/// One payload generation request for a single channel of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub channel: Channel,
    pub board: String,
    pub version: String,
    pub debug: bool,
    pub skip_tests: bool,
    pub skip_delta: bool,
}

impl GenerationJob {
    /// Same job with its channel carrying the `-channel` suffix.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.channel = self.channel.normalized();
        self
    }
}

/// Build-wide settings shared by every job of a stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub board: String,
    pub version: String,
    pub debug: bool,
    pub skip_tests: bool,
    pub skip_delta: bool,
}

impl JobTemplate {
    #[must_use]
    pub fn new(board: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            version: version.into(),
            debug: false,
            skip_tests: false,
            skip_delta: false,
        }
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub const fn with_skip_tests(mut self, skip_tests: bool) -> Self {
        self.skip_tests = skip_tests;
        self
    }

    #[must_use]
    pub const fn with_skip_delta(mut self, skip_delta: bool) -> Self {
        self.skip_delta = skip_delta;
        self
    }

    #[must_use]
    pub fn job_for(&self, channel: Channel) -> GenerationJob {
        GenerationJob {
            channel,
            board: self.board.clone(),
            version: self.version.clone(),
            debug: self.debug,
            skip_tests: self.skip_tests,
            skip_delta: self.skip_delta,
        }
    }
}
