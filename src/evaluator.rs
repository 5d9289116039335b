//! Per-poll evaluation of signer results across every expected channel.

use crate::content_store::ContentStore;
use crate::error::{PaygenError, Result};
use crate::poller::ReadinessProbe;
use crate::ports::PortFuture;
use crate::signer::SignerResultFetcher;
use crate::status_store::ChannelStatusStore;
use crate::types::{Channel, ChannelPhase, InstructionMap};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Receives each channel whose signer results all passed.
pub trait ChannelNotifier: Send {
    fn notify(&mut self, channel: Channel) -> PortFuture<'_, ()>;
}

impl ChannelNotifier for Vec<Channel> {
    fn notify(&mut self, channel: Channel) -> PortFuture<'_, ()> {
        self.push(channel);
        Box::pin(async { Ok(()) })
    }
}

pub struct ChannelReadinessEvaluator<S, N> {
    fetcher: SignerResultFetcher<S>,
    store: ChannelStatusStore,
    notifier: N,
    failed: BTreeMap<Channel, Vec<String>>,
    cycles: u64,
}

impl<S, N> ChannelReadinessEvaluator<S, N>
where
    S: ContentStore,
    N: ChannelNotifier,
{
    /// Build an evaluator expecting results for every channel in `instructions`.
    ///
    /// # Errors
    /// Returns `PaygenError::ChannelError` if two keys name the same release
    /// track (`stable` and `stable-channel`) or the map cannot seed the
    /// status store.
    pub fn new(
        fetcher: SignerResultFetcher<S>,
        instructions: &InstructionMap,
        notifier: N,
    ) -> Result<Self> {
        let mut tracks: BTreeMap<Channel, &Channel> = BTreeMap::new();
        let mut store = ChannelStatusStore::new();
        for (channel, urls) in instructions {
            if let Some(first) = tracks.insert(channel.normalized(), channel) {
                return Err(PaygenError::ChannelError(format!(
                    "Channels {first} and {channel} name the same release track"
                )));
            }
            store.ensure_channel(channel, urls.iter().cloned())?;
        }
        Ok(Self {
            fetcher,
            store,
            notifier,
            failed: BTreeMap::new(),
            cycles: 0,
        })
    }

    /// Run one poll cycle. Returns `true` once every channel is complete.
    ///
    /// # Errors
    /// Propagates content store failures and notifier failures. Malformed
    /// results are logged and retried on the next cycle.
    pub async fn check_for_results(&mut self) -> Result<bool> {
        self.cycles = self.cycles.saturating_add(1);
        let channels: Vec<Channel> = self.store.channels().cloned().collect();

        for channel in channels {
            if self.store.is_complete(&channel) {
                continue;
            }

            for url in self.store.missing_urls(&channel) {
                let result_url = url.result_url();
                match self.fetcher.fetch(&result_url).await {
                    Ok(Some(result)) if result.is_completed() => {
                        if self.store.record_if_new(&channel, &url, result)? {
                            debug!(%channel, url = %result_url, "recorded signer result");
                        }
                    }
                    Ok(Some(_)) => debug!(%channel, url = %result_url, "signing in progress"),
                    Ok(None) => debug!(%channel, url = %result_url, "no signer result yet"),
                    Err(PaygenError::MalformedResult { url, reason }) => {
                        warn!(%channel, %url, %reason, "could not parse signer result");
                    }
                    Err(other) => return Err(other),
                }
            }

            if self.store.is_complete(&channel) {
                self.settle(channel).await?;
            }
        }

        Ok(self.store.all_complete())
    }

    async fn settle(&mut self, channel: Channel) -> Result<()> {
        if self.store.is_successful(&channel) {
            info!(%channel, "signing passed for channel");
            return self.notifier.notify(channel).await;
        }

        let failed: Vec<String> = self
            .store
            .failed_urls(&channel)
            .iter()
            .map(crate::types::InstructionUrl::result_basename)
            .collect();
        warn!(%channel, results = %failed.iter().join(", "), "signing failed for channel");
        self.failed.insert(channel, failed);
        Ok(())
    }

    /// Failed result identifiers across all channels, in channel order.
    #[must_use]
    pub fn failed_results(&self) -> Vec<String> {
        self.failed.values().flatten().cloned().collect()
    }

    #[must_use]
    pub fn failed_channels(&self) -> Vec<Channel> {
        self.failed.keys().cloned().collect()
    }

    /// Aggregate failure report, `None` when no channel failed.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        let results = self.failed_results();
        (!results.is_empty()).then(|| results.join(", "))
    }

    /// Channels that have not collected every result yet.
    #[must_use]
    pub fn incomplete_channels(&self) -> Vec<Channel> {
        self.store
            .channels()
            .filter(|channel| !self.store.is_complete(channel))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn phases(&self) -> BTreeMap<Channel, ChannelPhase> {
        self.store.phases()
    }

    #[must_use]
    pub const fn store(&self) -> &ChannelStatusStore {
        &self.store
    }

    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl<S, N> ReadinessProbe for ChannelReadinessEvaluator<S, N>
where
    S: ContentStore,
    N: ChannelNotifier,
{
    fn probe(&mut self) -> PortFuture<'_, bool> {
        Box::pin(self.check_for_results())
    }
}
