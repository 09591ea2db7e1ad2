//! File layout of the data directory.
//!
//! Snapshots are keyed by target id: `{target}-snapshot.json`.

/// Fleet inventory document.
pub const FLEET: &str = "fleet.json";

/// Ranked-target list written by target selection.
pub const TOP_TARGETS: &str = "top_targets.json";

/// Suffix shared by every snapshot file.
pub const SNAPSHOT_SUFFIX: &str = "-snapshot.json";

/// File name of the snapshot for `target`.
pub fn snapshot_file(target: &str) -> String {
    format!("{target}{SNAPSHOT_SUFFIX}")
}
