//! Inspect command implementation.

use super::{format_millis, load_dataset, CommandResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tidesync_engine::Dataset;

/// Dataset inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Dataset id.
    pub dataset_id: String,
    /// Last known dataset hash.
    pub hash: Option<String>,
    /// Number of cached records.
    pub record_count: usize,
    /// Number of pending changes.
    pub pending_count: usize,
    /// Changes sent and awaiting an answer.
    pub in_flight_count: usize,
    /// Changes whose last send failed.
    pub crashed_count: usize,
    /// Changes waiting behind an in-flight change.
    pub delayed_count: usize,
    /// Acknowledgements to send with the next request.
    pub acknowledgement_count: usize,
    /// Seconds between scheduled syncs.
    pub sync_frequency: u64,
    /// Whether scheduled syncing is on.
    pub sync_active: bool,
    /// Start of the last sync loop.
    pub last_sync_start: Option<String>,
    /// End of the last sync loop.
    pub last_sync_end: Option<String>,
    /// Record hashes by uid (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<BTreeMap<String, String>>,
}

impl InspectResult {
    /// Summarizes `dataset`.
    pub fn from_dataset(dataset_id: &str, dataset: &Dataset, show_records: bool) -> Self {
        let pending = dataset.pending.values();
        Self {
            dataset_id: dataset_id.to_string(),
            hash: dataset.hash.clone(),
            record_count: dataset.records.len(),
            pending_count: dataset.pending.len(),
            in_flight_count: dataset.in_flight_count(),
            crashed_count: pending.clone().filter(|c| c.crashed).count(),
            delayed_count: pending.filter(|c| c.delayed).count(),
            acknowledgement_count: dataset.acknowledgements.len(),
            sync_frequency: dataset.config.sync_frequency,
            sync_active: dataset.config.sync_active,
            last_sync_start: format_millis(dataset.sync_loop_start),
            last_sync_end: format_millis(dataset.sync_loop_end),
            records: show_records.then(|| dataset.record_hashes()),
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, dataset_id: &str, show_records: bool, format: &str) -> CommandResult<()> {
    let dataset = load_dataset(path, dataset_id)?;
    let result = InspectResult::from_dataset(dataset_id, &dataset, show_records);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Tidesync Dataset Inspection");
    println!("===========================");
    println!();
    println!("Dataset: {}", result.dataset_id);
    println!("Hash:    {}", result.hash.as_deref().unwrap_or("(never synced)"));
    println!();
    println!("Records:");
    println!("  Cached records:   {}", result.record_count);
    println!("  Acknowledgements: {}", result.acknowledgement_count);
    println!();
    println!("Pending:");
    println!("  Total:     {}", result.pending_count);
    println!("  In flight: {}", result.in_flight_count);
    println!("  Crashed:   {}", result.crashed_count);
    println!("  Delayed:   {}", result.delayed_count);
    println!();
    println!("Sync:");
    println!("  Active:     {}", result.sync_active);
    println!("  Frequency:  {}s", result.sync_frequency);
    println!(
        "  Last start: {}",
        result.last_sync_start.as_deref().unwrap_or("-")
    );
    println!(
        "  Last end:   {}",
        result.last_sync_end.as_deref().unwrap_or("-")
    );

    if let Some(records) = &result.records {
        println!();
        println!("Record hashes:");
        for (uid, hash) in records {
            println!("  {} {}", uid, hash);
        }
    }
}
