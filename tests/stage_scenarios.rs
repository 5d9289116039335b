//! End-to-end stage runs against in-memory signer results and a scripted
//! generator.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use paygen::attributes::RunAttributes;
use paygen::{
    Channel, ChannelPhase, GenerationJob, GenerationOutcome, InstructionMap, InstructionUrl,
    JobDisposition, JobTemplate, MemoryContentStore, PayloadGenerator, PaygenError, PaygenStage,
    PortFuture, ReleaseConfig, StageOutcome, StageSettings,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PASSED: &str = r#"{"status": {"status": "passed"}}"#;
const FAILED: &str = r#"{"status": {"status": "failed"}}"#;

#[derive(Default)]
struct ScriptedGenerator {
    outcomes: HashMap<String, GenerationOutcome>,
    calls: Mutex<Vec<GenerationJob>>,
}

impl ScriptedGenerator {
    fn with(mut self, channel: &str, outcome: GenerationOutcome) -> Self {
        self.outcomes.insert(channel.to_string(), outcome);
        self
    }

    fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .map(|job| job.channel.value().to_string())
                    .collect()
            })
            .unwrap_or_default();
        channels.sort();
        channels
    }
}

impl PayloadGenerator for ScriptedGenerator {
    fn create_payloads<'a>(&'a self, job: &'a GenerationJob) -> PortFuture<'a, GenerationOutcome> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(job.clone());
            }
            Ok(self
                .outcomes
                .get(job.channel.value())
                .cloned()
                .unwrap_or(GenerationOutcome::Generated {
                    suite: Some(format!("paygen_au_{}", job.channel.short_name())),
                }))
        })
    }
}

fn instructions(entries: &[(&str, &[&str])]) -> InstructionMap {
    entries
        .iter()
        .map(|(channel, urls)| {
            (
                Channel::new(*channel),
                urls.iter().copied().map(InstructionUrl::new).collect(),
            )
        })
        .collect()
}

fn settings() -> StageSettings {
    StageSettings::new(JobTemplate::new("link", "9999.0.0"))
        .with_timing(Duration::from_secs(30), Duration::from_secs(90))
        .with_max_workers(2)
}

fn stage(
    settings: StageSettings,
    store: &MemoryContentStore,
    generator: &Arc<ScriptedGenerator>,
    attributes: RunAttributes,
) -> PaygenStage<MemoryContentStore, ScriptedGenerator> {
    PaygenStage::new(settings, store.clone(), Arc::clone(generator), attributes)
}

#[tokio::test(start_paused = true)]
async fn one_failed_image_blocks_its_channel_but_passing_channel_is_generated() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/u1.json", PASSED).await;
    store.put("gs://bucket/u2.json", PASSED).await;
    store.put("gs://bucket/u3.json", FAILED).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/u1"]),
        ("beta", &["gs://bucket/u2", "gs://bucket/u3"]),
    ])));

    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert_eq!(generator.channels(), vec!["stable-channel"]);
    match run.outcome {
        StageOutcome::Failed(PaygenError::SigningFailed { results }) => {
            assert_eq!(results, vec!["u3.json"]);
        }
        other => panic!("expected signing failure, got {other:?}"),
    }
    assert_eq!(
        run.report.channels.get(&Channel::new("beta")),
        Some(&ChannelPhase::Failed)
    );
    assert_eq!(
        run.report.channels.get(&Channel::new("stable")),
        Some(&ChannelPhase::Successful)
    );
    assert_eq!(run.report.failed_results, vec!["u3.json"]);
    assert!(run.report.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn instruction_keys_for_the_same_track_fail_without_generating() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/u1.json", PASSED).await;
    store.put("gs://bucket/u2.json", PASSED).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/u1"]),
        ("stable-channel", &["gs://bucket/u2"]),
    ])));

    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert!(matches!(
        run.outcome,
        StageOutcome::Failed(PaygenError::ChannelError(_))
    ));
    assert!(generator.channels().is_empty());
    assert_eq!(store.reads("gs://bucket/u1.json").await, 0);
}

#[tokio::test(start_paused = true)]
async fn late_results_are_picked_up_on_later_cycles() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/s1.json", PASSED).await;
    store
        .script("gs://bucket/b1.json", [None, None, Some(PASSED)])
        .await;
    let generator = Arc::new(ScriptedGenerator::default());
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/s1"]),
        ("beta", &["gs://bucket/b1"]),
    ])));

    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert!(matches!(run.outcome, StageOutcome::Success));
    assert_eq!(generator.channels(), vec!["beta-channel", "stable-channel"]);
    assert_eq!(store.reads("gs://bucket/s1.json").await, 1);
    assert_eq!(store.reads("gs://bucket/b1.json").await, 3);
}

#[tokio::test(start_paused = true)]
async fn missing_results_time_out_after_generating_ready_channels() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/s1.json", PASSED).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/s1"]),
        ("beta", &["gs://bucket/b1"]),
    ])));

    let started = tokio::time::Instant::now();
    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert_eq!(started.elapsed(), Duration::from_secs(90));
    assert_eq!(generator.channels(), vec!["stable-channel"]);
    match &run.outcome {
        StageOutcome::Failed(PaygenError::SigningTimeout(detail)) => {
            assert!(detail.contains("beta"), "{detail}");
            assert!(!detail.contains("stable"), "{detail}");
        }
        other => panic!("expected signing timeout, got {other:?}"),
    }
    assert_eq!(store.reads("gs://bucket/b1.json").await, 4);
    assert_eq!(
        run.report.channels.get(&Channel::new("beta")),
        Some(&ChannelPhase::Pending)
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_channels_skip_signing_entirely() {
    let store = MemoryContentStore::new();
    let generator = Arc::new(ScriptedGenerator::default());
    let (_publisher, attributes) = RunAttributes::channel();

    let run = stage(
        settings().with_explicit_channels(vec![Channel::new("stable"), Channel::new("beta")]),
        &store,
        &generator,
        attributes,
    )
    .execute()
    .await;

    assert!(matches!(run.outcome, StageOutcome::Success));
    assert_eq!(generator.channels(), vec!["beta-channel", "stable-channel"]);
    assert!(run.report.channels.is_empty());
    assert_eq!(run.report.jobs.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn upstream_failure_is_forgiven() {
    let store = MemoryContentStore::new();
    let generator = Arc::new(ScriptedGenerator::default());

    let run = stage(settings(), &store, &generator, RunAttributes::ready(None))
        .execute()
        .await;

    assert!(matches!(run.outcome, StageOutcome::Forgiven { .. }));
    assert!(generator.channels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stage_waits_for_instructions_published_later() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/s1.json", PASSED).await;
    let generator = Arc::new(ScriptedGenerator::default());
    let (publisher, attributes) = RunAttributes::channel();
    let paygen = stage(settings(), &store, &generator, attributes);

    let publish = async {
        tokio::time::sleep(Duration::from_secs(600)).await;
        publisher
            .publish(Some(instructions(&[("stable", &["gs://bucket/s1"])])))
            .map_err(|err| err.to_string())
    };
    let (run, published) = tokio::join!(paygen.execute(), publish);

    assert_eq!(published, Ok(()));
    assert!(matches!(run.outcome, StageOutcome::Success));
    assert_eq!(generator.channels(), vec!["stable-channel"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_board_is_forgiven_without_generating() {
    let store = MemoryContentStore::new();
    let generator = Arc::new(ScriptedGenerator::default());
    let release_config = ReleaseConfig::from_json_str(
        r#"{"delta": [{"board": {"public_codename": "samus"}, "channel": "stable"}]}"#,
    )
    .map_err(|err| err.to_string());
    let Ok(release_config) = release_config else {
        panic!("release config should parse");
    };

    let run = stage(
        settings().with_explicit_channels(vec![Channel::new("stable")]),
        &store,
        &generator,
        RunAttributes::ready(None),
    )
    .with_release_config(release_config)
    .execute()
    .await;

    match run.outcome {
        StageOutcome::Forgiven { warning } => assert!(warning.contains("link"), "{warning}"),
        other => panic!("expected forgiven outcome, got {other:?}"),
    }
    assert!(generator.channels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn locked_builds_are_skipped_not_failed() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/s1.json", PASSED).await;
    store.put("gs://bucket/b1.json", PASSED).await;
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with("beta-channel", GenerationOutcome::Locked("paygen-server".to_string())),
    );
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/s1"]),
        ("beta", &["gs://bucket/b1"]),
    ])));

    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert!(matches!(run.outcome, StageOutcome::Success));
    assert_eq!(run.report.skipped.len(), 1);
    assert!(run.report.skipped[0].starts_with("beta-channel: "));
}

#[tokio::test(start_paused = true)]
async fn test_lab_failure_is_a_warning() {
    let store = MemoryContentStore::new();
    let generator = Arc::new(ScriptedGenerator::default().with(
        "stable-channel",
        GenerationOutcome::TestLabFailure("no DUTs available".to_string()),
    ));

    let run = stage(
        settings().with_explicit_channels(vec![Channel::new("stable")]),
        &store,
        &generator,
        RunAttributes::ready(None),
    )
    .execute()
    .await;

    match run.outcome {
        StageOutcome::Forgiven { warning } => {
            assert!(warning.contains("no DUTs available"), "{warning}");
        }
        other => panic!("expected forgiven outcome, got {other:?}"),
    }
    assert!(matches!(
        run.report.jobs[0].disposition,
        JobDisposition::TestLabFailure(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn signing_failure_takes_precedence_over_generation_failure() {
    let store = MemoryContentStore::new();
    store.put("gs://bucket/s1.json", PASSED).await;
    store.put("gs://bucket/b1.json", FAILED).await;
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with("stable-channel", GenerationOutcome::Failed("RuntimeError".to_string())),
    );
    let attributes = RunAttributes::ready(Some(instructions(&[
        ("stable", &["gs://bucket/s1"]),
        ("beta", &["gs://bucket/b1"]),
    ])));

    let run = stage(settings(), &store, &generator, attributes)
        .execute()
        .await;

    assert!(matches!(
        run.outcome,
        StageOutcome::Failed(PaygenError::SigningFailed { .. })
    ));
    assert!(run.report.jobs[0].disposition.is_hard_failure());
}

#[tokio::test(start_paused = true)]
async fn generation_failure_fails_the_stage() {
    let store = MemoryContentStore::new();
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with("dev-channel", GenerationOutcome::NotReady("no test image".to_string())),
    );

    let run = stage(
        settings().with_explicit_channels(vec![Channel::new("dev"), Channel::new("beta")]),
        &store,
        &generator,
        RunAttributes::ready(None),
    )
    .execute()
    .await;

    match run.outcome {
        StageOutcome::Failed(PaygenError::GenerationFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].starts_with("dev-channel: "));
        }
        other => panic!("expected generation failure, got {other:?}"),
    }
}
