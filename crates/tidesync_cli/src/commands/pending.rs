//! Pending command implementation.

use super::{format_millis, load_dataset, CommandResult};
use std::path::Path;
use tidesync_engine::PendingChange;

/// Runs the pending command.
pub fn run(path: &Path, dataset_id: &str, in_flight_only: bool, format: &str) -> CommandResult<()> {
    let dataset = load_dataset(path, dataset_id)?;
    let changes = select(dataset.pending.into_values(), in_flight_only);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        _ => {
            println!("Pending changes for {}: {}", dataset_id, changes.len());
            for change in &changes {
                println!("{}", describe(change));
            }
        }
    }

    Ok(())
}

/// Orders changes by timestamp, optionally keeping only in-flight ones.
fn select(changes: impl Iterator<Item = PendingChange>, in_flight_only: bool) -> Vec<PendingChange> {
    let mut changes: Vec<_> = changes
        .filter(|change| !in_flight_only || change.in_flight)
        .collect();
    changes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));
    changes
}

fn describe(change: &PendingChange) -> String {
    let mut flags = Vec::new();
    if change.in_flight {
        flags.push("in-flight".to_string());
    }
    if change.crashed {
        flags.push(format!("crashed x{}", change.crashed_count));
    }
    if change.delayed {
        let waiting = change.waiting.as_deref().unwrap_or("?");
        flags.push(format!("waiting on {}", short(waiting)));
    }

    let mut line = format!(
        "  {} {:<6} uid={} at {}",
        short(&change.hash),
        change.action,
        change.uid,
        format_millis(Some(change.timestamp)).unwrap_or_else(|| change.timestamp.to_string()),
    );
    if !flags.is_empty() {
        line.push_str(&format!(" [{}]", flags.join(", ")));
    }
    line
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seed;

    #[test]
    fn in_flight_filter() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = seed(dir.path(), "ds");

        let all = select(dataset.pending.clone().into_values(), false);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let in_flight = select(dataset.pending.into_values(), true);
        assert_eq!(in_flight.len(), 2);
        assert!(in_flight.iter().all(|c| c.in_flight));
    }

    #[test]
    fn describe_shows_flags() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = seed(dir.path(), "ds");
        let mut change = dataset.pending.values().find(|c| c.in_flight).cloned().unwrap();
        change.crashed = true;
        change.crashed_count = 2;

        let line = describe(&change);
        assert!(line.contains("create"));
        assert!(line.contains("in-flight"));
        assert!(line.contains("crashed x2"));
        assert!(line.contains(&change.hash[..12]));
    }

    #[test]
    fn short_keeps_short_hashes() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
    }
}
