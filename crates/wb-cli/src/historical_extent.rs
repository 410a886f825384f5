use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{info, warn};
use wb_core::artifacts::read_uid_list;
use wb_dynamic_attrs::{
    DynamicAttrsConfig, DynamicAttrsEngine, RecomputeReport, UidPartitioner,
    DEFAULT_MAX_PARALLEL_STEPS,
};
use wb_storage::WaterbodyStore;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum HistoricalExtentCommand {
    /// Get all the waterbody uids for which to update the dynamic attributes.
    #[command(alias = "get-waterbodies-uids")]
    GetUids(GetUidsArgs),
    /// Update the dynamic attributes for a list of waterbodies.
    UpdateDynamicAttrs(UpdateDynamicAttrsArgs),
}

#[derive(Args, Debug)]
pub struct GetUidsArgs {
    /// Maximum number of parallel steps to have in the workflow.
    #[arg(long, default_value_t = default_max_parallel_steps())]
    pub max_parallel_steps: NonZeroUsize,
}

#[derive(Args, Debug)]
pub struct UpdateDynamicAttrsArgs {
    /// JSON file holding the waterbody uids, flat or as a list of chunks.
    #[arg(long)]
    pub uids_list_file: String,
}

fn default_max_parallel_steps() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_PARALLEL_STEPS).unwrap_or(NonZeroUsize::MIN)
}

/// Opens the waterbodies database, which is owned upstream and must
/// already exist.
pub fn open_store(path: &Path) -> Result<WaterbodyStore> {
    WaterbodyStore::open_existing(path)
        .with_context(|| format!("Failed to open database {}", path.display()))
}

pub fn run(
    command: HistoricalExtentCommand,
    store: &WaterbodyStore,
    config: DynamicAttrsConfig,
) -> Result<()> {
    match command {
        HistoricalExtentCommand::GetUids(args) => {
            let report = UidPartitioner::new(config.output_dir)
                .run(store, args.max_parallel_steps)
                .context("Failed to write waterbody uid chunks")?;
            info!(
                event = "get_uids_done",
                uid_count = report.uid_count,
                chunk_count = report.chunk_count
            );
            Ok(())
        }
        HistoricalExtentCommand::UpdateDynamicAttrs(args) => {
            update_dynamic_attrs(&args, store, config, Local::now().date_naive()).map(|_| ())
        }
    }
}

fn update_dynamic_attrs(
    args: &UpdateDynamicAttrsArgs,
    store: &WaterbodyStore,
    config: DynamicAttrsConfig,
    run_date: NaiveDate,
) -> Result<RecomputeReport> {
    let uids = read_uid_list(&args.uids_list_file)
        .with_context(|| format!("Failed to read uid list {}", args.uids_list_file))?;
    if uids.is_empty() {
        warn!(event = "empty_uid_list", path = %args.uids_list_file);
    }

    DynamicAttrsEngine::new(config)
        .recompute(store, &uids, run_date)
        .context("Failed to record failed waterbody uids")
}
