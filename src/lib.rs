pub mod attributes;
pub mod content_store;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod poller;
pub mod ports;
pub mod release_config;
pub mod signer;
pub mod stage;
pub mod status_store;
pub mod types;

pub use attributes::RunAttributes;
pub use content_store::{ContentStore, FsContentStore, MemoryContentStore};
pub use dispatcher::{DispatchReport, JobDisposition, JobRecord, PayloadJobDispatcher};
pub use error::{code, PaygenError, Result};
pub use evaluator::{ChannelNotifier, ChannelReadinessEvaluator};
pub use generator::{CommandGenerator, GenerationOutcome, PayloadGenerator};
pub use poller::{wait_for_return_true, ReadinessProbe};
pub use ports::PortFuture;
pub use release_config::ReleaseConfig;
pub use signer::SignerResultFetcher;
pub use stage::{PaygenStage, StageOutcome, StageReport, StageRun, StageSettings};
pub use status_store::ChannelStatusStore;
pub use types::*;
