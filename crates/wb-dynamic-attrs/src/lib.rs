use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;
use wb_core::artifacts::ArtifactError;
use wb_core::{default_history_start, QualityPolicy};
use wb_storage::StorageError;

mod engine;
mod partitioner;

pub use engine::{AttrsOutcome, DynamicAttrsEngine, RecomputeReport};
pub use partitioner::{PartitionReport, UidPartitioner};

pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/";
pub const DEFAULT_MAX_PARALLEL_STEPS: usize = 7_000;

/// Run-level failure. Aborts the invocation.
#[derive(Debug, Error)]
pub enum DynamicAttrsError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Per-waterbody failure. Recorded in the failed uid list, never fatal.
#[derive(Debug, Error)]
pub enum RecomputeError {
    #[error("waterbody {0} does not exist in the historical extent table")]
    UnknownWaterbody(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAttrsConfig {
    pub quality: QualityPolicy,
    /// Lower bound of the observation window; the upper bound is the run date.
    pub history_start: NaiveDate,
    pub output_dir: PathBuf,
}

impl Default for DynamicAttrsConfig {
    fn default() -> Self {
        Self {
            quality: QualityPolicy::default(),
            history_start: default_history_start(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
