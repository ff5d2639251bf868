//! Wall-clock time in the units persisted with datasets.

/// Returns milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
