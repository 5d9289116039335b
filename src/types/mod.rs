mod identifiers;
mod job;
mod signer_result;
mod stage;

pub use identifiers::{Channel, InstructionUrl, CHANNEL_SUFFIX, RESULT_SUFFIX};
pub use job::{GenerationJob, JobTemplate};
pub use signer_result::{
    SignerResult, SignerStatus, StatusBlock, SIGNER_STATUS_FAILED, SIGNER_STATUS_PASSED,
};
pub use stage::{ChannelPhase, RunMode};

use std::collections::BTreeMap;

/// Signer instruction URLs per channel, as delivered by the push-image step.
pub type InstructionMap = BTreeMap<Channel, Vec<InstructionUrl>>;
