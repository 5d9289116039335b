#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

mod cli;
mod config;
mod output;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, OutputFormat};
use config::{load_config, PaygenConfig};
use output::{emit_error, emit_output, stage_exit_code, stage_payload};
use paygen::attributes::load_instruction_file;
use paygen::error::ERROR_CODES;
use paygen::{
    Channel, ChannelReadinessEvaluator, CommandGenerator, FsContentStore, JobTemplate,
    PaygenError, PaygenStage, ReleaseConfig, Result, RunAttributes, SignerResultFetcher,
    StageSettings,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let format = cli.output;
    let command = command_name(&cli.command);
    let exit_code = match runtime.block_on(dispatch(cli)) {
        Ok(code) => code,
        Err(err) => {
            emit_error(format, command, &err);
            err.exit_code()
        }
    };

    drop(runtime);
    std::process::exit(exit_code);
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Run { .. } => "run",
        Commands::Check { .. } => "check",
        Commands::Codes => "codes",
    }
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let format = cli.output;
    match cli.command {
        Commands::Run {
            board,
            version,
            instructions,
            channel,
            debug,
            skip_tests,
            skip_delta,
        } => {
            let config = load_config(cli.config).await?;
            debug!(?config, "loaded paygen config");

            let template = JobTemplate::new(board, version)
                .with_debug(debug)
                .with_skip_tests(skip_tests)
                .with_skip_delta(skip_delta);
            let explicit: Vec<Channel> = channel.into_iter().map(Channel::new).collect();

            let attributes = match (&instructions, explicit.is_empty()) {
                (Some(path), true) => RunAttributes::ready(load_instruction_file(path).await?),
                _ => RunAttributes::ready(None),
            };

            let settings = StageSettings::new(template)
                .with_explicit_channels(explicit)
                .with_timing(config.poll_period, config.signing_timeout)
                .with_max_workers(config.max_workers);
            let generator = Arc::new(CommandGenerator::from_command_line(
                &config.generator_command,
            )?);
            let mut stage = PaygenStage::new(
                settings,
                FsContentStore::new(&config.content_root),
                generator,
                attributes,
            );
            if let Some(release_config) = load_release_config(&config).await? {
                stage = stage.with_release_config(release_config);
            }

            let run = stage.execute().await;
            emit_output(format, "run", run.outcome.status(), &stage_payload(&run));
            Ok(stage_exit_code(&run.outcome))
        }

        Commands::Check { instructions } => {
            let config = load_config(cli.config).await?;
            check_signing(&config, &instructions, format).await?;
            Ok(0)
        }

        Commands::Codes => {
            let codes: Vec<_> = ERROR_CODES
                .iter()
                .map(|(code, description, fix)| {
                    json!({"code": code, "description": description, "fix": fix})
                })
                .collect();
            let message = ERROR_CODES
                .iter()
                .map(|(code, description, fix)| format!("{code:<12} {description}. {fix}"))
                .collect::<Vec<_>>()
                .join("\n");
            emit_output(
                format,
                "codes",
                "ok",
                &json!({"codes": codes, "message": message}),
            );
            Ok(0)
        }
    }
}

async fn load_release_config(config: &PaygenConfig) -> Result<Option<ReleaseConfig>> {
    match &config.release_config_path {
        Some(path) => {
            info!(path = %path.display(), "loading release config");
            ReleaseConfig::load(path).await.map(Some)
        }
        None => Ok(None),
    }
}

async fn check_signing(config: &PaygenConfig, instructions: &Path, format: OutputFormat) -> Result<()> {
    let instructions = load_instruction_file(instructions).await?.ok_or_else(|| {
        PaygenError::MissingInstructions("instructions file holds null".to_string())
    })?;

    let fetcher = SignerResultFetcher::new(FsContentStore::new(&config.content_root));
    let mut evaluator = ChannelReadinessEvaluator::new(fetcher, &instructions, Vec::<Channel>::new())?;
    let complete = evaluator.check_for_results().await?;

    let phases = evaluator.phases();
    let message = phases
        .iter()
        .map(|(channel, phase)| format!("{:<20} {phase}", channel.value()))
        .chain(evaluator.failure_message().map(|failed| format!("failed results: {failed}")))
        .collect::<Vec<_>>()
        .join("\n");

    emit_output(
        format,
        "check",
        if complete { "complete" } else { "pending" },
        &json!({
            "complete": complete,
            "channels": phases,
            "ready": evaluator.notifier(),
            "failed_results": evaluator.failed_results(),
            "message": message,
        }),
    );
    Ok(())
}
