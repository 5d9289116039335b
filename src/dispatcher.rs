//! Bounded worker pool running one payload generation job per channel.
//!
//! Jobs go through a bounded queue to a fixed set of workers. Each worker
//! writes one record per job to a result queue; [`DispatchHandle::finish`]
//! closes the queue, waits for every worker and collects the records.

use crate::error::{PaygenError, Result};
use crate::evaluator::ChannelNotifier;
use crate::generator::{GenerationOutcome, PayloadGenerator};
use crate::ports::PortFuture;
use crate::types::{Channel, GenerationJob, JobTemplate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_WORKERS: usize = 4;

/// What happened to one job, from the stage's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", content = "detail", rename_all = "snake_case")]
pub enum JobDisposition {
    Generated { suite: Option<String> },
    /// Another process finished, locked or skipped the same build.
    AlreadyHandled(String),
    TestLabFailure(String),
    Failed(String),
}

impl JobDisposition {
    #[must_use]
    pub fn from_outcome(outcome: GenerationOutcome) -> Self {
        match outcome {
            GenerationOutcome::Generated { suite } => Self::Generated { suite },
            GenerationOutcome::Finished(detail) => {
                Self::AlreadyHandled(format!("build already finished: {detail}"))
            }
            GenerationOutcome::Locked(detail) => {
                Self::AlreadyHandled(format!("build locked by another process: {detail}"))
            }
            GenerationOutcome::Skipped(detail) => {
                Self::AlreadyHandled(format!("build marked to skip: {detail}"))
            }
            GenerationOutcome::NotReady(detail) => {
                Self::Failed(format!("build images not ready: {detail}"))
            }
            GenerationOutcome::TestLabFailure(detail) => Self::TestLabFailure(detail),
            GenerationOutcome::Failed(detail) => Self::Failed(detail),
        }
    }

    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: GenerationJob,
    pub disposition: JobDisposition,
}

impl JobRecord {
    /// `"<channel>: <detail>"` for logs and error messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let detail = match &self.disposition {
            JobDisposition::Generated { .. } => "generated",
            JobDisposition::AlreadyHandled(detail)
            | JobDisposition::TestLabFailure(detail)
            | JobDisposition::Failed(detail) => detail,
        };
        format!("{}: {detail}", self.job.channel)
    }
}

/// Every job record of one dispatch, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub records: Vec<JobRecord>,
}

impl DispatchReport {
    #[must_use]
    pub fn hard_failures(&self) -> Vec<&JobRecord> {
        self.records
            .iter()
            .filter(|record| record.disposition.is_hard_failure())
            .collect()
    }

    #[must_use]
    pub fn already_handled(&self) -> Vec<&JobRecord> {
        self.records
            .iter()
            .filter(|record| matches!(record.disposition, JobDisposition::AlreadyHandled(_)))
            .collect()
    }

    #[must_use]
    pub fn test_lab_failures(&self) -> Vec<&JobRecord> {
        self.records
            .iter()
            .filter(|record| matches!(record.disposition, JobDisposition::TestLabFailure(_)))
            .collect()
    }

    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .records
            .iter()
            .map(|record| record.job.channel.clone())
            .collect();
        channels.sort();
        channels
    }

    /// Fail if any job failed for a reason other than a benign race.
    ///
    /// # Errors
    /// Returns `PaygenError::GenerationFailed` listing each hard failure, or
    /// `PaygenError::TestLabFailure` when the only problems were test scheduling.
    pub fn ensure_success(&self) -> Result<()> {
        let hard = self.hard_failures();
        if !hard.is_empty() {
            return Err(PaygenError::GenerationFailed {
                failures: hard.iter().map(|record| record.summary()).collect(),
            });
        }

        let lab = self.test_lab_failures();
        if !lab.is_empty() {
            return Err(PaygenError::TestLabFailure(
                lab.iter()
                    .map(|record| record.summary())
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }
        Ok(())
    }
}

/// Run one job: normalize the channel, generate, classify the outcome.
pub async fn run_generation_job<G>(generator: &G, job: GenerationJob) -> JobRecord
where
    G: PayloadGenerator + ?Sized,
{
    let job = job.normalized();
    info!(channel = %job.channel, board = %job.board, version = %job.version, "starting payload generation");

    let disposition = match generator.create_payloads(&job).await {
        Ok(outcome) => JobDisposition::from_outcome(outcome),
        Err(err) => JobDisposition::Failed(err.to_string()),
    };

    match &disposition {
        JobDisposition::Generated { suite } => {
            info!(channel = %job.channel, suite = ?suite, "payload generation finished");
        }
        JobDisposition::AlreadyHandled(reason) => {
            info!(channel = %job.channel, "Paygen skipped because: {reason}");
        }
        JobDisposition::TestLabFailure(reason) => {
            warn!(channel = %job.channel, %reason, "payload tests could not be scheduled");
        }
        JobDisposition::Failed(reason) => {
            error!(channel = %job.channel, %reason, "payload generation failed");
        }
    }

    JobRecord { job, disposition }
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadJobDispatcher {
    max_workers: usize,
}

impl Default for PayloadJobDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl PayloadJobDispatcher {
    /// A dispatcher with at most `max_workers` concurrent jobs (minimum one).
    #[must_use]
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Spawn the worker pool. Jobs can be submitted while it runs.
    #[must_use]
    pub fn start<G>(&self, generator: Arc<G>) -> DispatchHandle
    where
        G: PayloadGenerator + ?Sized + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<GenerationJob>(self.max_workers);
        let (record_tx, record_rx) = mpsc::unbounded_channel::<JobRecord>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();

        for _ in 0..self.max_workers {
            let job_rx = Arc::clone(&job_rx);
            let record_tx = record_tx.clone();
            let generator = Arc::clone(&generator);
            workers.spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some(job) = next else {
                        break;
                    };
                    let record = run_generation_job(generator.as_ref(), job).await;
                    if record_tx.send(record).is_err() {
                        break;
                    }
                }
            });
        }

        DispatchHandle {
            job_tx,
            record_rx,
            workers,
        }
    }

    /// Run every job in `jobs` and wait for all of them.
    pub async fn dispatch<G, I>(&self, jobs: I, generator: Arc<G>) -> DispatchReport
    where
        G: PayloadGenerator + ?Sized + 'static,
        I: IntoIterator<Item = GenerationJob>,
    {
        let handle = self.start(generator);
        let submitter = handle.submitter();
        for job in jobs {
            if let Err(err) = submitter.submit(job).await {
                error!(%err, "could not queue payload job");
            }
        }
        drop(submitter);
        handle.finish().await
    }
}

pub struct DispatchHandle {
    job_tx: mpsc::Sender<GenerationJob>,
    record_rx: mpsc::UnboundedReceiver<JobRecord>,
    workers: JoinSet<()>,
}

impl DispatchHandle {
    /// A cloneable entry point for queueing jobs.
    #[must_use]
    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter {
            job_tx: self.job_tx.clone(),
        }
    }

    /// A notifier that queues one job per successful channel.
    #[must_use]
    pub fn channel_notifier(&self, template: JobTemplate) -> ChannelJobNotifier {
        ChannelJobNotifier {
            submitter: self.submitter(),
            template,
        }
    }

    /// Close the queue and wait until every queued job has run.
    ///
    /// Submitters still alive elsewhere keep the queue open; drop them first.
    pub async fn finish(self) -> DispatchReport {
        let Self {
            job_tx,
            mut record_rx,
            mut workers,
        } = self;
        drop(job_tx);

        let mut report = DispatchReport::default();
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(%err, "payload worker terminated abnormally");
                report.records.push(JobRecord {
                    job: JobTemplate::new("unknown", "unknown").job_for(Channel::new("unknown")),
                    disposition: JobDisposition::Failed(format!("worker terminated: {err}")),
                });
            }
        }

        while let Ok(record) = record_rx.try_recv() {
            report.records.push(record);
        }
        report
    }
}

#[derive(Debug, Clone)]
pub struct JobSubmitter {
    job_tx: mpsc::Sender<GenerationJob>,
}

impl JobSubmitter {
    /// Queue `job`, waiting while the queue is full.
    ///
    /// # Errors
    /// Returns `PaygenError::Internal` if the worker pool has shut down.
    pub async fn submit(&self, job: GenerationJob) -> Result<()> {
        self.job_tx
            .send(job)
            .await
            .map_err(|err| PaygenError::Internal(format!("payload queue closed: {err}")))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelJobNotifier {
    submitter: JobSubmitter,
    template: JobTemplate,
}

impl ChannelNotifier for ChannelJobNotifier {
    fn notify(&mut self, channel: Channel) -> PortFuture<'_, ()> {
        let job = self.template.job_for(channel);
        Box::pin(async move { self.submitter.submit(job).await })
    }
}
