//! Payload generation port and the external-program implementation.
//!
//! Generation can lose a race against another process working on the same
//! build. Those outcomes (`Finished`, `Locked`, `Skipped`) are reported as
//! values, never as errors, so callers classify them explicitly.

use crate::error::{PaygenError, Result};
use crate::ports::PortFuture;
use crate::types::GenerationJob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

pub const MAX_GENERATOR_OUTPUT_CAPTURE_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// Payloads were generated; `suite` names the scheduled test suite.
    Generated { suite: Option<String> },
    /// Another process already finished this build.
    Finished(String),
    /// Another process holds the lock for this build.
    Locked(String),
    /// The build was marked to be skipped.
    Skipped(String),
    /// Not every image needed for generation exists yet.
    NotReady(String),
    /// Payloads were generated but their tests could not be scheduled.
    TestLabFailure(String),
    Failed(String),
}

impl GenerationOutcome {
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Locked(_) | Self::Skipped(_))
    }
}

pub trait PayloadGenerator: Send + Sync {
    /// Generate (and schedule tests for) every payload of one channel.
    fn create_payloads<'a>(&'a self, job: &'a GenerationJob) -> PortFuture<'a, GenerationOutcome>;
}

impl<T> PayloadGenerator for std::sync::Arc<T>
where
    T: PayloadGenerator + ?Sized,
{
    fn create_payloads<'a>(&'a self, job: &'a GenerationJob) -> PortFuture<'a, GenerationOutcome> {
        (**self).create_payloads(job)
    }
}

#[derive(Debug, Clone)]
pub struct StreamCapture {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Read `stream` to its end, keeping at most `max_bytes`.
///
/// # Errors
/// Returns `PaygenError::IoError` if reading fails.
pub async fn capture_stream_limited<R>(mut stream: R, max_bytes: usize) -> Result<StreamCapture>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0_u8; 8_192];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }

        let remaining = max_bytes.saturating_sub(bytes.len());
        if remaining == 0 {
            truncated = true;
            continue;
        }

        let to_copy = remaining.min(read);
        bytes.extend_from_slice(&chunk[..to_copy]);
        if to_copy < read {
            truncated = true;
        }
    }

    Ok(StreamCapture { bytes, truncated })
}

/// Runs an external generator program once per job.
///
/// The program receives `--board`, `--version` and `--channel`, plus
/// `--debug`, `--skip-tests` and `--skip-delta` when set. It may print a JSON
/// object `{"outcome": "...", "detail": "..."}` on stdout to report a benign
/// or classified outcome; otherwise exit status decides.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    base_args: Vec<String>,
}

impl CommandGenerator {
    /// Split `command` on whitespace into program and leading arguments.
    ///
    /// # Errors
    /// Returns `PaygenError::ConfigError` for an empty command.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| PaygenError::ConfigError("Generator command is empty".to_string()))?;
        Ok(Self {
            program,
            base_args: parts.collect(),
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args_for(&self, job: &GenerationJob) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "--board".to_string(),
            job.board.clone(),
            "--version".to_string(),
            job.version.clone(),
            "--channel".to_string(),
            job.channel.value().to_string(),
        ]);
        if job.debug {
            args.push("--debug".to_string());
        }
        if job.skip_tests {
            args.push("--skip-tests".to_string());
        }
        if job.skip_delta {
            args.push("--skip-delta".to_string());
        }
        args
    }

    async fn run(&self, job: &GenerationJob) -> Result<GenerationOutcome> {
        let args = self.args_for(job);
        debug!(program = %self.program, ?args, "starting payload generator");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                PaygenError::Internal(format!("Failed to execute {}: {err}", self.program))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PaygenError::Internal(format!("Failed to capture {} stdout", self.program))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            PaygenError::Internal(format!("Failed to capture {} stderr", self.program))
        })?;

        let stdout_task = tokio::spawn(async move {
            capture_stream_limited(stdout, MAX_GENERATOR_OUTPUT_CAPTURE_BYTES).await
        });
        let stderr_task = tokio::spawn(async move {
            capture_stream_limited(stderr, MAX_GENERATOR_OUTPUT_CAPTURE_BYTES).await
        });

        let status = child.wait().await?;
        let stdout_capture = stdout_task.await.map_err(|err| {
            PaygenError::Internal(format!("Failed to read {} stdout: {err}", self.program))
        })??;
        let stderr_capture = stderr_task.await.map_err(|err| {
            PaygenError::Internal(format!("Failed to read {} stderr: {err}", self.program))
        })??;

        let stdout_text = String::from_utf8_lossy(&stdout_capture.bytes);
        let stderr_text = String::from_utf8_lossy(&stderr_capture.bytes)
            .trim()
            .to_string();

        if let Some(outcome) = parse_reported_outcome(&stdout_text) {
            return Ok(outcome);
        }

        if status.success() {
            return Ok(GenerationOutcome::Generated { suite: None });
        }

        let exit_code = status.code().map_or(-1, |code| code);
        Ok(GenerationOutcome::Failed(if stderr_text.is_empty() {
            format!("{} exited with status {exit_code}", self.program)
        } else {
            format!(
                "{} exited with status {exit_code}: {stderr_text}{}",
                self.program,
                if stderr_capture.truncated {
                    " (truncated)"
                } else {
                    ""
                }
            )
        }))
    }
}

impl PayloadGenerator for CommandGenerator {
    fn create_payloads<'a>(&'a self, job: &'a GenerationJob) -> PortFuture<'a, GenerationOutcome> {
        Box::pin(self.run(job))
    }
}

/// Find the last outcome report in generator output.
///
/// A report is a line starting with a JSON object carrying an `outcome` key.
/// Trailing text after the object on the same line is ignored.
#[must_use]
pub fn parse_reported_outcome(output: &str) -> Option<GenerationOutcome> {
    output
        .lines()
        .rev()
        .map(str::trim_start)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| {
            serde_json::Deserializer::from_str(line)
                .into_iter::<Value>()
                .next()
                .and_then(std::result::Result::ok)
                .and_then(|value| outcome_from_report(&value))
        })
}

fn outcome_from_report(report: &Value) -> Option<GenerationOutcome> {
    let detail = report
        .get("detail")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match report.get("outcome").and_then(Value::as_str)? {
        "generated" => Some(GenerationOutcome::Generated {
            suite: report
                .get("suite")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "finished" => Some(GenerationOutcome::Finished(detail)),
        "locked" => Some(GenerationOutcome::Locked(detail)),
        "skipped" => Some(GenerationOutcome::Skipped(detail)),
        "not_ready" => Some(GenerationOutcome::NotReady(detail)),
        "test_lab_failure" => Some(GenerationOutcome::TestLabFailure(detail)),
        "failed" => Some(GenerationOutcome::Failed(detail)),
        _ => None,
    }
}
