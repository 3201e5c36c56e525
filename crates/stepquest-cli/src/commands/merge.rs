use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use stepquest_core::storage::{data_dir, get_or_create_device_id_at};
use stepquest_core::{Database, Journal};

use super::open_journal;

#[derive(Args)]
pub struct MergeArgs {
    /// Database that receives the local progress
    #[arg(long)]
    into: PathBuf,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: MergeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let local = open_journal()?;
    let target = Journal::new(Arc::new(Database::open_at(&args.into)?));
    let device_id = get_or_create_device_id_at(&data_dir()?)?;

    let summary = local.merge_into(&target, &device_id)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "merged {} steps and {} missions into {} ({} already present)",
            summary.steps_added,
            summary.missions_copied,
            args.into.display(),
            summary.duplicates_skipped
        );
    }
    Ok(())
}
