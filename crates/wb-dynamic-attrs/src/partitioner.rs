use crate::DynamicAttrsError;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::info;
use wb_core::artifacts::write_work_units;
use wb_core::partition_uids;
use wb_storage::WaterbodyStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub uid_count: usize,
    pub chunk_count: usize,
    pub chunks_path: PathBuf,
    pub count_path: PathBuf,
}

/// Splits every stored waterbody uid into work units for the parallel
/// recompute steps and writes them out as `uids_chunks`/`uids_chunks_count`.
pub struct UidPartitioner {
    output_dir: PathBuf,
}

impl UidPartitioner {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn run<S>(
        &self,
        store: &S,
        max_parallel_steps: NonZeroUsize,
    ) -> Result<PartitionReport, DynamicAttrsError>
    where
        S: WaterbodyStorage + ?Sized,
    {
        let uids = store.waterbody_uids()?;
        info!(event = "uids_loaded", count = uids.len());

        let chunks = partition_uids(&uids, max_parallel_steps);
        info!(
            event = "uids_chunked",
            uid_count = uids.len(),
            chunk_count = chunks.len(),
            max_parallel_steps = max_parallel_steps.get()
        );

        let paths = write_work_units(&self.output_dir, &chunks)?;
        info!(event = "chunks_written", path = %paths.chunks_path.display());
        info!(event = "chunk_count_written", path = %paths.count_path.display());

        Ok(PartitionReport {
            uid_count: uids.len(),
            chunk_count: chunks.len(),
            chunks_path: paths.chunks_path,
            count_path: paths.count_path,
        })
    }
}
