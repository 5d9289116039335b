//! Per-channel bookkeeping of signer results for one stage run.
//!
//! Results are only ever added. A URL that already has a result is never
//! overwritten, so a channel that completed stays complete.

use crate::error::{PaygenError, Result};
use crate::types::{Channel, ChannelPhase, InstructionUrl, SignerResult};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
struct ChannelState {
    expected: Vec<InstructionUrl>,
    collected: HashMap<InstructionUrl, SignerResult>,
}

impl ChannelState {
    fn is_complete(&self) -> bool {
        self.collected.len() == self.expected.len()
    }

    fn is_successful(&self) -> bool {
        self.is_complete() && self.collected.values().all(SignerResult::is_passed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelStatusStore {
    channels: BTreeMap<Channel, ChannelState>,
}

impl ChannelStatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` with the instruction URLs it expects results for.
    ///
    /// Repeating the call with the same URL set is a no-op; duplicates in the
    /// input are collapsed, first occurrence wins the fetch order.
    ///
    /// # Errors
    /// Returns `PaygenError::ChannelError` if the channel is already known with
    /// a different URL set.
    pub fn ensure_channel<I>(&mut self, channel: &Channel, expected_urls: I) -> Result<()>
    where
        I: IntoIterator<Item = InstructionUrl>,
    {
        let expected: Vec<InstructionUrl> = expected_urls.into_iter().unique().collect();

        if let Some(existing) = self.channels.get(channel) {
            let known: BTreeSet<&InstructionUrl> = existing.expected.iter().collect();
            let requested: BTreeSet<&InstructionUrl> = expected.iter().collect();
            if known != requested {
                return Err(PaygenError::ChannelError(format!(
                    "Channel {channel} already expects {} instruction(s); refusing to change them to {}",
                    known.len(),
                    requested.len()
                )));
            }
            return Ok(());
        }

        self.channels.insert(
            channel.clone(),
            ChannelState {
                expected,
                collected: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Record `result` for `url` unless a result is already recorded.
    ///
    /// Returns whether the result was stored.
    ///
    /// # Errors
    /// Returns `PaygenError::ChannelError` when the channel is unknown or `url`
    /// is not one of its expected instructions.
    pub fn record_if_new(
        &mut self,
        channel: &Channel,
        url: &InstructionUrl,
        result: SignerResult,
    ) -> Result<bool> {
        let state = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| PaygenError::ChannelError(format!("Unknown channel {channel}")))?;

        if !state.expected.contains(url) {
            return Err(PaygenError::ChannelError(format!(
                "{url} is not an expected instruction for channel {channel}"
            )));
        }

        if state.collected.contains_key(url) {
            return Ok(false);
        }
        state.collected.insert(url.clone(), result);
        Ok(true)
    }

    #[must_use]
    pub fn contains(&self, channel: &Channel) -> bool {
        self.channels.contains_key(channel)
    }

    #[must_use]
    pub fn is_complete(&self, channel: &Channel) -> bool {
        self.channels
            .get(channel)
            .is_some_and(ChannelState::is_complete)
    }

    /// Only meaningful once the channel is complete.
    #[must_use]
    pub fn is_successful(&self, channel: &Channel) -> bool {
        self.channels
            .get(channel)
            .is_some_and(ChannelState::is_successful)
    }

    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.channels.values().all(ChannelState::is_complete)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.keys()
    }

    /// Expected URLs of `channel` without a recorded result, in fetch order.
    #[must_use]
    pub fn missing_urls(&self, channel: &Channel) -> Vec<InstructionUrl> {
        self.channels
            .get(channel)
            .map(|state| {
                state
                    .expected
                    .iter()
                    .filter(|url| !state.collected.contains_key(*url))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expected URLs of `channel` whose recorded result is `failed`.
    #[must_use]
    pub fn failed_urls(&self, channel: &Channel) -> Vec<InstructionUrl> {
        self.channels
            .get(channel)
            .map(|state| {
                state
                    .expected
                    .iter()
                    .filter(|url| {
                        state
                            .collected
                            .get(*url)
                            .is_some_and(SignerResult::is_failed)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn collected_count(&self, channel: &Channel) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |state| state.collected.len())
    }

    #[must_use]
    pub fn phase(&self, channel: &Channel) -> Option<ChannelPhase> {
        self.channels.get(channel).map(|state| {
            if state.is_complete() {
                if state.is_successful() {
                    ChannelPhase::Successful
                } else {
                    ChannelPhase::Failed
                }
            } else if state.collected.is_empty() {
                ChannelPhase::Pending
            } else {
                ChannelPhase::Fetching {
                    collected: state.collected.len(),
                    expected: state.expected.len(),
                }
            }
        })
    }

    #[must_use]
    pub fn phases(&self) -> BTreeMap<Channel, ChannelPhase> {
        self.channels
            .keys()
            .filter_map(|channel| self.phase(channel).map(|phase| (channel.clone(), phase)))
            .collect()
    }
}
