//! Clear command implementation.

use super::{open_registry, CommandResult};
use std::path::Path;
use tracing::info;

/// Runs the clear command.
pub fn run(path: &Path, dataset_id: &str, dry_run: bool) -> CommandResult<()> {
    let registry = open_registry(path)?;
    let Some(dataset) = registry.load(dataset_id)? else {
        return Err(format!("No dataset {:?} in {:?}", dataset_id, path).into());
    };

    let unsent = dataset.pending.len();
    if dry_run {
        println!(
            "Would clear dataset {} ({} records, {} pending changes)",
            dataset_id,
            dataset.records.len(),
            unsent
        );
        return Ok(());
    }

    registry.remove_stored(dataset_id)?;
    info!(dataset_id, unsent, "dataset cache cleared");
    println!("Cleared dataset {}", dataset_id);
    if unsent > 0 {
        println!("Warning: {} pending changes were never confirmed", unsent);
    }
    Ok(())
}
