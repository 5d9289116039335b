#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use paygen::dispatcher::DEFAULT_MAX_WORKERS;
use paygen::stage::{SIGNING_PERIOD, SIGNING_TIMEOUT};
use paygen::{PaygenError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = ".paygen/config.toml";
pub const DEFAULT_GENERATOR_COMMAND: &str = "cros_generate_payloads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaygenConfig {
    pub poll_period: Duration,
    pub signing_timeout: Duration,
    pub max_workers: usize,
    pub content_root: PathBuf,
    pub generator_command: String,
    pub release_config_path: Option<PathBuf>,
}

impl Default for PaygenConfig {
    fn default() -> Self {
        Self {
            poll_period: SIGNING_PERIOD,
            signing_timeout: SIGNING_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
            content_root: PathBuf::from("."),
            generator_command: DEFAULT_GENERATOR_COMMAND.to_string(),
            release_config_path: None,
        }
    }
}

/// On-disk layout of `.paygen/config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    poll_period_secs: Option<u64>,
    signing_timeout_secs: Option<u64>,
    max_workers: Option<usize>,
    content_root: Option<String>,
    generator_command: Option<String>,
    release_config: Option<String>,
}

/// Load config from `path` (or the default location), then apply
/// `PAYGEN_*` environment overrides.
///
/// # Errors
/// Returns `PaygenError::ConfigError` if the file cannot be read or parsed,
/// an override is not a number, or a value fails validation.
pub async fn load_config(path: Option<PathBuf>) -> Result<PaygenConfig> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let base = if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| PaygenError::ConfigError(format!("Failed to read config: {e}")))?;
        parse_config_content(&content, &config_path)?
    } else {
        PaygenConfig::default()
    };

    let config = apply_env_overrides(base, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// # Errors
/// Returns `PaygenError::ConfigError` for invalid TOML or unknown keys.
pub fn parse_config_content(content: &str, origin: &Path) -> Result<PaygenConfig> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| {
        PaygenError::ConfigError(format!("Failed to parse {}: {e}", origin.display()))
    })?;
    let defaults = PaygenConfig::default();

    Ok(PaygenConfig {
        poll_period: file
            .poll_period_secs
            .map_or(defaults.poll_period, Duration::from_secs),
        signing_timeout: file
            .signing_timeout_secs
            .map_or(defaults.signing_timeout, Duration::from_secs),
        max_workers: file.max_workers.unwrap_or(defaults.max_workers),
        content_root: file
            .content_root
            .map_or(defaults.content_root, |root| PathBuf::from(expand_env_vars(&root))),
        generator_command: file
            .generator_command
            .map_or(defaults.generator_command, |cmd| expand_env_vars(&cmd)),
        release_config_path: file
            .release_config
            .map(|path| PathBuf::from(expand_env_vars(&path))),
    })
}

/// Environment wins over the file. `lookup` is `std::env::var` outside tests.
///
/// # Errors
/// Returns `PaygenError::ConfigError` when a numeric override does not parse.
pub fn apply_env_overrides<F>(mut config: PaygenConfig, lookup: F) -> Result<PaygenConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(secs) = non_empty("PAYGEN_POLL_PERIOD_SECS") {
        config.poll_period = Duration::from_secs(parse_number("PAYGEN_POLL_PERIOD_SECS", &secs)?);
    }
    if let Some(secs) = non_empty("PAYGEN_SIGNING_TIMEOUT_SECS") {
        config.signing_timeout =
            Duration::from_secs(parse_number("PAYGEN_SIGNING_TIMEOUT_SECS", &secs)?);
    }
    if let Some(workers) = non_empty("PAYGEN_MAX_WORKERS") {
        config.max_workers = parse_number("PAYGEN_MAX_WORKERS", &workers)?;
    }
    if let Some(root) = non_empty("PAYGEN_CONTENT_ROOT") {
        config.content_root = PathBuf::from(root);
    }
    if let Some(command) = non_empty("PAYGEN_GENERATOR_CMD") {
        config.generator_command = command;
    }
    Ok(config)
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PaygenError::ConfigError(format!("{name} must be a number, got '{value}'")))
}

/// # Errors
/// Returns `PaygenError::ConfigError` for a zero poll period or zero workers.
pub fn validate(config: &PaygenConfig) -> Result<()> {
    if config.poll_period.is_zero() {
        return Err(PaygenError::ConfigError(
            "poll_period_secs must be greater than zero".to_string(),
        ));
    }
    if config.max_workers == 0 {
        return Err(PaygenError::ConfigError(
            "max_workers must be at least 1".to_string(),
        ));
    }
    if config.generator_command.trim().is_empty() {
        return Err(PaygenError::ConfigError(
            "generator_command must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let mut cursor = 0;
    while let Some(offset) = result[cursor..].find("${") {
        let start = cursor + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_part = &result[start + 2..start + end];
        let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
        let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
        result.replace_range(start..=(start + end), &value);
        cursor = start + value.len();
    }
    result
}
