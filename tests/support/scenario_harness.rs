use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PASSED: &str = r#"{"status": {"status": "passed"}}"#;
pub const FAILED: &str = r#"{"status": {"status": "failed"}}"#;

/// A scratch directory with a config file, a content root and the binary.
#[derive(Debug)]
pub struct PaygenScenario {
    binary_path: PathBuf,
    dir: TempDir,
}

impl PaygenScenario {
    pub fn new() -> Result<Self, String> {
        let dir = TempDir::new().map_err(|err| format!("tempdir: {err}"))?;
        std::fs::create_dir_all(dir.path().join("gs"))
            .map_err(|err| format!("content root: {err}"))?;
        Ok(Self {
            binary_path: PathBuf::from(assert_cmd::cargo::cargo_bin!("paygen")),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `config.toml` pointing at the scenario's content root.
    pub fn write_config(&self, generator_command: &str, extra: &str) -> Result<PathBuf, String> {
        let config_path = self.path().join("config.toml");
        let content = format!(
            "content_root = '{}'\ngenerator_command = '{generator_command}'\npoll_period_secs = 1\nsigning_timeout_secs = 3\n{extra}\n",
            self.path().join("gs").display()
        );
        std::fs::write(&config_path, content).map_err(|err| format!("config: {err}"))?;
        Ok(config_path)
    }

    /// Store a signer result at `gs://<object>` under the content root.
    pub fn put_result(&self, object: &str, body: &str) -> Result<(), String> {
        let target = self.path().join("gs").join(object);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|err| format!("mkdir: {err}"))?;
        }
        std::fs::write(target, body).map_err(|err| format!("write result: {err}"))
    }

    pub fn write_instructions(&self, body: &str) -> Result<PathBuf, String> {
        let path = self.path().join("instructions.json");
        std::fs::write(&path, body).map_err(|err| format!("instructions: {err}"))?;
        Ok(path)
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .current_dir(self.path())
            .env_remove("PAYGEN_POLL_PERIOD_SECS")
            .env_remove("PAYGEN_SIGNING_TIMEOUT_SECS")
            .env_remove("PAYGEN_MAX_WORKERS")
            .env_remove("PAYGEN_CONTENT_ROOT")
            .env_remove("PAYGEN_GENERATOR_CMD")
            .env("RUST_LOG", "warn");
        command
    }
}

pub fn parse_json_line(stdout: &[u8]) -> Result<Value, String> {
    let raw = String::from_utf8_lossy(stdout).trim().to_string();
    serde_json::from_str::<Value>(&raw)
        .map_err(|err| format!("expected JSON output, got '{raw}': {err}"))
}
