//! One-shot delivery of signer instructions from the push-image step.
//!
//! The push-image step publishes exactly once: either the instruction URLs
//! per channel, or `None` when it failed. Readers wait without a timeout.

use crate::error::{PaygenError, Result};
use crate::types::InstructionMap;
use std::path::Path;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Unset,
    Published(Option<InstructionMap>),
}

/// Publishing side, held by whoever produces the instructions.
#[derive(Debug)]
pub struct InstructionPublisher {
    tx: watch::Sender<Slot>,
}

impl InstructionPublisher {
    /// Publish the instructions, `None` signalling upstream failure.
    ///
    /// # Errors
    /// Returns `PaygenError::Internal` if instructions were already published.
    pub fn publish(&self, instructions: Option<InstructionMap>) -> Result<()> {
        let published = self.tx.send_if_modified(|slot| {
            if *slot == Slot::Unset {
                *slot = Slot::Published(instructions);
                true
            } else {
                false
            }
        });
        if published {
            Ok(())
        } else {
            Err(PaygenError::Internal(
                "push image instructions already published".to_string(),
            ))
        }
    }
}

/// Reading side, shared by stages of the same board run.
#[derive(Debug, Clone)]
pub struct RunAttributes {
    rx: watch::Receiver<Slot>,
}

impl RunAttributes {
    #[must_use]
    pub fn channel() -> (InstructionPublisher, Self) {
        let (tx, rx) = watch::channel(Slot::Unset);
        (InstructionPublisher { tx }, Self { rx })
    }

    /// Attributes whose instructions are already known.
    #[must_use]
    pub fn ready(instructions: Option<InstructionMap>) -> Self {
        let (_tx, rx) = watch::channel(Slot::Published(instructions));
        Self { rx }
    }

    /// Wait, without timeout, until instructions are published.
    ///
    /// A publisher dropped without publishing counts as upstream failure.
    pub async fn wait_for_instructions(&self) -> Option<InstructionMap> {
        let mut rx = self.rx.clone();
        loop {
            if let Slot::Published(instructions) = &*rx.borrow_and_update() {
                return instructions.clone();
            }
            if rx.changed().await.is_err() {
                return match &*rx.borrow() {
                    Slot::Published(instructions) => instructions.clone(),
                    Slot::Unset => None,
                };
            }
        }
    }
}

/// Read an instruction file: a JSON object of channel to URL list, or `null`.
///
/// # Errors
/// Returns `PaygenError::ConfigError` if the file cannot be read, or
/// `PaygenError::SerializationError` if it is not valid JSON of that shape.
pub async fn load_instruction_file(path: &Path) -> Result<Option<InstructionMap>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|err| {
        PaygenError::ConfigError(format!(
            "Failed to read instructions {}: {err}",
            path.display()
        ))
    })?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::{load_instruction_file, RunAttributes};
    use crate::types::{Channel, InstructionMap, InstructionUrl};

    fn sample() -> InstructionMap {
        InstructionMap::from([(
            Channel::new("stable"),
            vec![InstructionUrl::new("gs://s/u1")],
        )])
    }

    #[tokio::test]
    async fn waiter_receives_published_instructions() {
        let (publisher, attributes) = RunAttributes::channel();
        let waiter = {
            let attributes = attributes.clone();
            tokio::spawn(async move { attributes.wait_for_instructions().await })
        };

        publisher.publish(Some(sample())).unwrap();
        assert_eq!(waiter.await.unwrap(), Some(sample()));
        assert_eq!(attributes.wait_for_instructions().await, Some(sample()));
    }

    #[tokio::test]
    async fn second_publish_is_rejected() {
        let (publisher, attributes) = RunAttributes::channel();
        publisher.publish(None).unwrap();
        assert!(publisher.publish(Some(sample())).is_err());
        assert_eq!(attributes.wait_for_instructions().await, None);
    }

    #[tokio::test]
    async fn dropped_publisher_reads_as_upstream_failure() {
        let (publisher, attributes) = RunAttributes::channel();
        drop(publisher);
        assert_eq!(attributes.wait_for_instructions().await, None);
    }

    #[tokio::test]
    async fn instruction_file_accepts_map_or_null() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let map_path = temp_dir.path().join("instructions.json");
        tokio::fs::write(&map_path, r#"{"stable": ["gs://s/u1"]}"#)
            .await
            .unwrap();
        assert_eq!(
            load_instruction_file(&map_path).await.unwrap(),
            Some(sample())
        );

        let null_path = temp_dir.path().join("null.json");
        tokio::fs::write(&null_path, "null").await.unwrap();
        assert_eq!(load_instruction_file(&null_path).await.unwrap(), None);
    }
}
