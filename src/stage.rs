//! The paygen stage: wait for signing, generate payloads per channel, and
//! translate what went wrong into the build's warning-or-failure outcome.

use crate::attributes::RunAttributes;
use crate::content_store::ContentStore;
use crate::dispatcher::{DispatchReport, JobRecord, PayloadJobDispatcher, DEFAULT_MAX_WORKERS};
use crate::error::{PaygenError, Result};
use crate::evaluator::{ChannelNotifier, ChannelReadinessEvaluator};
use crate::generator::PayloadGenerator;
use crate::poller::wait_for_return_true;
use crate::release_config::ReleaseConfig;
use crate::signer::SignerResultFetcher;
use crate::types::{Channel, ChannelPhase, InstructionMap, JobTemplate, RunMode};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const SIGNING_PERIOD: Duration = Duration::from_secs(30);
pub const SIGNING_TIMEOUT: Duration = Duration::from_secs(7200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSettings {
    pub template: JobTemplate,
    /// When non-empty, generate for exactly these channels without waiting
    /// for signing.
    pub explicit_channels: Vec<Channel>,
    pub poll_period: Duration,
    pub signing_timeout: Duration,
    pub max_workers: usize,
}

impl StageSettings {
    #[must_use]
    pub fn new(template: JobTemplate) -> Self {
        Self {
            template,
            explicit_channels: Vec::new(),
            poll_period: SIGNING_PERIOD,
            signing_timeout: SIGNING_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    #[must_use]
    pub fn with_explicit_channels(mut self, channels: Vec<Channel>) -> Self {
        self.explicit_channels = channels;
        self
    }

    #[must_use]
    pub const fn with_timing(mut self, poll_period: Duration, signing_timeout: Duration) -> Self {
        self.poll_period = poll_period;
        self.signing_timeout = signing_timeout;
        self
    }

    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn mode(&self) -> RunMode {
        if self.explicit_channels.is_empty() {
            RunMode::Signed
        } else {
            RunMode::Explicit
        }
    }
}

/// Result of a stage run as the build sees it.
#[derive(Debug)]
pub enum StageOutcome {
    Success,
    /// Something was missing from the environment; the build carries on.
    Forgiven { warning: String },
    Failed(PaygenError),
}

impl StageOutcome {
    /// Classify a stage error. Anything not known to be an environment gap
    /// fails the stage.
    #[must_use]
    pub fn from_error(err: PaygenError) -> Self {
        match err {
            PaygenError::BoardNotConfigured(_)
            | PaygenError::MissingInstructions(_)
            | PaygenError::TestLabFailure(_) => Self::Forgiven {
                warning: err.to_string(),
            },
            other => Self::Failed(other),
        }
    }

    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Forgiven { .. } => "forgiven",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Forgiven { warning } => Some(warning.clone()),
            Self::Failed(err) => Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub run_id: Uuid,
    pub board: String,
    pub version: String,
    pub mode: RunMode,
    pub channels: BTreeMap<Channel, ChannelPhase>,
    pub failed_results: Vec<String>,
    pub jobs: Vec<JobRecord>,
    /// Jobs another process already finished, locked or skipped.
    pub skipped: Vec<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageReport {
    fn new(run_id: Uuid, settings: &StageSettings) -> Self {
        Self {
            run_id,
            board: settings.template.board.clone(),
            version: settings.template.version.clone(),
            mode: settings.mode(),
            channels: BTreeMap::new(),
            failed_results: Vec::new(),
            jobs: Vec::new(),
            skipped: Vec::new(),
            finished_at: None,
        }
    }

    fn absorb_dispatch(&mut self, dispatch: &DispatchReport) {
        self.jobs.clone_from(&dispatch.records);
        self.skipped = dispatch
            .already_handled()
            .iter()
            .map(|record| record.summary())
            .collect();
    }
}

#[derive(Debug)]
pub struct StageRun {
    pub outcome: StageOutcome,
    pub report: StageReport,
}

struct SigningSummary {
    waited: Result<()>,
    phases: BTreeMap<Channel, ChannelPhase>,
    failed_results: Vec<String>,
    incomplete: Vec<Channel>,
}

impl SigningSummary {
    fn into_result(self, timeout: Duration) -> Result<()> {
        match self.waited {
            Err(PaygenError::PollTimeout { .. }) => Err(PaygenError::SigningTimeout(format!(
                "no complete signer results after {}s for: {}",
                timeout.as_secs(),
                self.incomplete.iter().join(", ")
            ))),
            Err(other) => Err(other),
            Ok(()) if !self.failed_results.is_empty() => Err(PaygenError::SigningFailed {
                results: self.failed_results,
            }),
            Ok(()) => Ok(()),
        }
    }
}

pub struct PaygenStage<S, G: ?Sized> {
    settings: StageSettings,
    store: S,
    generator: Arc<G>,
    attributes: RunAttributes,
    release_config: Option<ReleaseConfig>,
}

impl<S, G> PaygenStage<S, G>
where
    S: ContentStore + Clone,
    G: PayloadGenerator + ?Sized + 'static,
{
    #[must_use]
    pub const fn new(
        settings: StageSettings,
        store: S,
        generator: Arc<G>,
        attributes: RunAttributes,
    ) -> Self {
        Self {
            settings,
            store,
            generator,
            attributes,
            release_config: None,
        }
    }

    #[must_use]
    pub fn with_release_config(mut self, release_config: ReleaseConfig) -> Self {
        self.release_config = Some(release_config);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Run the stage and classify its result.
    pub async fn execute(&self) -> StageRun {
        let run_id = Uuid::new_v4();
        let mut report = StageReport::new(run_id, &self.settings);
        let span = info_span!(
            "paygen_stage",
            %run_id,
            board = %self.settings.template.board,
            version = %self.settings.template.version,
            mode = %self.settings.mode(),
        );

        let result = self.perform(&mut report).instrument(span).await;
        report.finished_at = Some(Utc::now());

        let outcome = result.map_or_else(StageOutcome::from_error, |()| StageOutcome::Success);
        match &outcome {
            StageOutcome::Success => info!(%run_id, "paygen stage succeeded"),
            StageOutcome::Forgiven { warning } => {
                warn!(%run_id, %warning, "paygen stage forgiven");
            }
            StageOutcome::Failed(err) => error!(%run_id, %err, "paygen stage failed"),
        }
        StageRun { outcome, report }
    }

    async fn perform(&self, report: &mut StageReport) -> Result<()> {
        let template = &self.settings.template;
        if let Some(release_config) = &self.release_config {
            release_config.validate_board(&template.board)?;
        }

        let dispatcher = PayloadJobDispatcher::new(self.settings.max_workers);

        if !self.settings.explicit_channels.is_empty() {
            info!(channels = %self.settings.explicit_channels.iter().join(", "), "generating for explicit channels");
            let jobs = self
                .settings
                .explicit_channels
                .iter()
                .map(|channel| template.job_for(channel.clone()));
            let dispatch = dispatcher.dispatch(jobs, Arc::clone(&self.generator)).await;
            report.absorb_dispatch(&dispatch);
            return dispatch.ensure_success();
        }

        let instructions = self
            .attributes
            .wait_for_instructions()
            .await
            .ok_or_else(|| {
                PaygenError::MissingInstructions(format!(
                    "push image produced no signer instructions for {} {}",
                    template.board, template.version
                ))
            })?;

        let handle = dispatcher.start(Arc::clone(&self.generator));
        let signing = self
            .wait_for_signing(&instructions, handle.channel_notifier(template.clone()))
            .await;
        let dispatch = handle.finish().await;

        report.channels.clone_from(&signing.phases);
        report.failed_results.clone_from(&signing.failed_results);
        report.absorb_dispatch(&dispatch);

        signing.into_result(self.settings.signing_timeout)?;
        dispatch.ensure_success()
    }

    async fn wait_for_signing<N>(&self, instructions: &InstructionMap, notifier: N) -> SigningSummary
    where
        N: ChannelNotifier,
    {
        let fetcher = SignerResultFetcher::new(self.store.clone());
        let mut evaluator = match ChannelReadinessEvaluator::new(fetcher, instructions, notifier) {
            Ok(evaluator) => evaluator,
            Err(err) => {
                return SigningSummary {
                    waited: Err(err),
                    phases: BTreeMap::new(),
                    failed_results: Vec::new(),
                    incomplete: Vec::new(),
                }
            }
        };

        info!(
            channels = %instructions.keys().join(", "),
            period_secs = self.settings.poll_period.as_secs(),
            timeout_secs = self.settings.signing_timeout.as_secs(),
            "waiting for signer results"
        );
        let waited = wait_for_return_true(
            &mut evaluator,
            Some(self.settings.signing_timeout),
            self.settings.poll_period,
        )
        .await;

        SigningSummary {
            waited,
            phases: evaluator.phases(),
            failed_results: evaluator.failed_results(),
            incomplete: evaluator.incomplete_channels(),
        }
    }
}
