//! Hash command implementation.

use super::CommandResult;
use serde::Serialize;
use serde_json::Value;
use tidesync_protocol::{canonical_string, generate_hash, Sha256Hash};

/// Hash computation result.
#[derive(Debug, Serialize)]
pub struct HashResult {
    /// SHA-256 hash of the canonical form.
    pub hash: String,
    /// Canonical form (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

/// Hashes JSON text the way the engine hashes records.
pub fn compute(json: &str, show_canonical: bool) -> CommandResult<HashResult> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| format!("Invalid JSON input: {}", e))?;
    Ok(HashResult {
        hash: generate_hash(&Sha256Hash, &value),
        canonical: show_canonical.then(|| canonical_string(&value)),
    })
}

/// Runs the hash command.
pub fn run(json: &str, show_canonical: bool, format: &str) -> CommandResult<()> {
    let result = compute(json, show_canonical)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            if let Some(canonical) = &result.canonical {
                println!("Canonical: {}", canonical);
            }
            println!("{}", result.hash);
        }
    }

    Ok(())
}
