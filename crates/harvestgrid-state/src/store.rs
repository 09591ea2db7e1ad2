//! StateStore — the data directory shared by producers and the scheduler.
//!
//! Provides typed read/write operations over target snapshots, the fleet
//! inventory, and the ranked-target list. The store is the only place in
//! HarvestGrid that touches these files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use harvest_core::{RankedTarget, TargetSnapshot, WorkerNode};

use crate::error::{StateError, StateResult};
use crate::files;

/// Source of fresh target snapshots. Read once per cycle.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self, target: &str) -> StateResult<TargetSnapshot>;
}

/// Enumerates worker nodes and their capacity at call time.
pub trait FleetInventory: Send + Sync {
    fn nodes(&self) -> StateResult<Vec<WorkerNode>>;
}

/// On-disk shape of `fleet.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FleetDocument {
    nodes: Vec<WorkerNode>,
}

/// Handle to the data directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Open (or create) the data directory at `root`.
    pub fn open(root: &Path) -> StateResult<Self> {
        std::fs::create_dir_all(root).map_err(|source| StateError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        debug!(path = ?root, "state store opened");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Write (or replace) the snapshot for `snapshot.target`.
    pub fn put_snapshot(&self, snapshot: &TargetSnapshot) -> StateResult<()> {
        validate_key(&snapshot.target)?;
        let path = self.root.join(files::snapshot_file(&snapshot.target));
        write_json(&path, snapshot)?;
        debug!(target = %snapshot.target, "snapshot stored");
        Ok(())
    }

    /// Read the snapshot for `target`, or `None` when no file exists.
    pub fn get_snapshot(&self, target: &str) -> StateResult<Option<TargetSnapshot>> {
        validate_key(target)?;
        let path = self.root.join(files::snapshot_file(target));
        read_json(&path)
    }

    /// All readable snapshots, sorted by target id. Corrupt files are skipped.
    pub fn list_snapshots(&self) -> StateResult<Vec<TargetSnapshot>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| StateError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut results = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateError::Io {
                path: self.root.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(files::SNAPSHOT_SUFFIX) {
                continue;
            }
            match read_json::<TargetSnapshot>(&entry.path()) {
                Ok(Some(snapshot)) => results.push(snapshot),
                Ok(None) => {}
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable snapshot"),
            }
        }
        results.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(results)
    }

    /// Delete the snapshot for `target`. Returns true if it existed.
    pub fn delete_snapshot(&self, target: &str) -> StateResult<bool> {
        validate_key(target)?;
        let path = self.root.join(files::snapshot_file(target));
        remove_file(&path)
    }

    // ── Fleet ──────────────────────────────────────────────────────

    /// Replace the fleet inventory.
    pub fn put_fleet(&self, nodes: &[WorkerNode]) -> StateResult<()> {
        let doc = FleetDocument {
            nodes: nodes.to_vec(),
        };
        write_json(&self.root.join(files::FLEET), &doc)?;
        debug!(nodes = nodes.len(), "fleet inventory stored");
        Ok(())
    }

    /// Current fleet inventory. An absent file means an empty fleet.
    pub fn get_fleet(&self) -> StateResult<Vec<WorkerNode>> {
        let doc: Option<FleetDocument> = read_json(&self.root.join(files::FLEET))?;
        Ok(doc.unwrap_or_default().nodes)
    }

    // ── Ranking ────────────────────────────────────────────────────

    /// Replace the ranked-target list.
    pub fn put_ranking(&self, ranking: &[RankedTarget]) -> StateResult<()> {
        write_json(&self.root.join(files::TOP_TARGETS), &ranking)?;
        debug!(entries = ranking.len(), "ranking stored");
        Ok(())
    }

    /// The ranked-target list, best first. Empty when never written.
    pub fn get_ranking(&self) -> StateResult<Vec<RankedTarget>> {
        let ranking: Option<Vec<RankedTarget>> = read_json(&self.root.join(files::TOP_TARGETS))?;
        Ok(ranking.unwrap_or_default())
    }
}

impl SnapshotSource for StateStore {
    fn snapshot(&self, target: &str) -> StateResult<TargetSnapshot> {
        self.get_snapshot(target)?
            .ok_or_else(|| StateError::NotFound(files::snapshot_file(target)))
    }
}

impl FleetInventory for StateStore {
    fn nodes(&self) -> StateResult<Vec<WorkerNode>> {
        self.get_fleet()
    }
}

/// Keys become file names, so they must not escape the data directory.
fn validate_key(key: &str) -> StateResult<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StateError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StateResult<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let value = serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(value))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StateResult<()> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StateError::Serialize(e.to_string()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    std::fs::write(&tmp, &bytes).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> StateResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn test_snapshot(target: &str) -> TargetSnapshot {
        TargetSnapshot {
            target: target.to_string(),
            defense_level: 10.0,
            min_defense: 5.0,
            value: 1_000.0,
            max_value: 50_000.0,
            weaken_effect_per_thread: 0.05,
            harvest_yield_per_thread: 0.004,
            growth_security_per_thread: 0.004,
            harvest_security_per_thread: 0.002,
            growth_multiplier_per_thread: 1.01,
            stabilize_cost: 1.75,
            grow_cost: 1.75,
            harvest_cost: 1.7,
            stabilize_ms: 12_000.0,
            grow_ms: 9_600.0,
            harvest_ms: 3_000.0,
            worker_pool: vec!["pool-0".to_string(), "pool-1".to_string()],
            auxiliary_nodes: vec!["foodnstuff".to_string()],
            required_skill: 10,
            operator_skill: 120,
            accessible: true,
            captured_at: 1_700_000_000,
        }
    }

    // ── Snapshots ──────────────────────────────────────────────────

    #[test]
    fn snapshot_roundtrip_preserves_every_field() {
        let (_dir, store) = test_store();
        let snap = test_snapshot("joesguns");

        store.put_snapshot(&snap).unwrap();
        let back = store.get_snapshot("joesguns").unwrap();

        assert_eq!(back, Some(snap));
    }

    #[test]
    fn snapshot_missing_returns_none() {
        let (_dir, store) = test_store();
        assert!(store.get_snapshot("nowhere").unwrap().is_none());
    }

    #[test]
    fn snapshot_source_reports_missing_input() {
        let (_dir, store) = test_store();
        let err = store.snapshot("nowhere").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
        assert!(err.is_missing_input());
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let (_dir, store) = test_store();
        std::fs::write(
            store.root().join(files::snapshot_file("broken")),
            b"{ not json",
        )
        .unwrap();

        let err = store.snapshot("broken").unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
        assert!(err.is_missing_input());
    }

    #[test]
    fn snapshot_rejects_path_like_keys() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.get_snapshot("../etc"),
            Err(StateError::InvalidKey(_))
        ));
        assert!(matches!(store.get_snapshot(""), Err(StateError::InvalidKey(_))));
    }

    #[test]
    fn list_snapshots_skips_corrupt_and_foreign_files() {
        let (_dir, store) = test_store();
        store.put_snapshot(&test_snapshot("b-target")).unwrap();
        store.put_snapshot(&test_snapshot("a-target")).unwrap();
        std::fs::write(store.root().join(files::snapshot_file("junk")), b"[]").unwrap();
        std::fs::write(store.root().join("notes.txt"), b"hello").unwrap();

        let all = store.list_snapshots().unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(ids, vec!["a-target", "b-target"]);
    }

    #[test]
    fn snapshot_update_in_place() {
        let (_dir, store) = test_store();
        let mut snap = test_snapshot("joesguns");
        store.put_snapshot(&snap).unwrap();

        snap.defense_level = 7.5;
        store.put_snapshot(&snap).unwrap();

        let back = store.snapshot("joesguns").unwrap();
        assert_eq!(back.defense_level, 7.5);
    }

    #[test]
    fn snapshot_delete() {
        let (_dir, store) = test_store();
        store.put_snapshot(&test_snapshot("joesguns")).unwrap();

        assert!(store.delete_snapshot("joesguns").unwrap());
        assert!(!store.delete_snapshot("joesguns").unwrap());
    }

    // ── Fleet ──────────────────────────────────────────────────────

    #[test]
    fn fleet_absent_is_empty() {
        let (_dir, store) = test_store();
        assert!(store.nodes().unwrap().is_empty());
    }

    #[test]
    fn fleet_roundtrip_keeps_order() {
        let (_dir, store) = test_store();
        let nodes = vec![
            WorkerNode::new("home", 64.0, 8.0),
            WorkerNode::new("pool-0", 32.0, 0.0),
        ];
        store.put_fleet(&nodes).unwrap();
        assert_eq!(store.nodes().unwrap(), nodes);
    }

    // ── Ranking ────────────────────────────────────────────────────

    #[test]
    fn ranking_roundtrip() {
        let (_dir, store) = test_store();
        let ranking = vec![
            RankedTarget {
                target: "phantasy".to_string(),
                score: 52.5,
            },
            RankedTarget {
                target: "joesguns".to_string(),
                score: 11.0,
            },
        ];
        store.put_ranking(&ranking).unwrap();
        assert_eq!(store.get_ranking().unwrap(), ranking);
    }

    #[test]
    fn writes_leave_no_temp_files() {
        let (_dir, store) = test_store();
        store.put_snapshot(&test_snapshot("joesguns")).unwrap();
        store.put_fleet(&[WorkerNode::new("home", 8.0, 0.0)]).unwrap();

        let leftovers = std::fs::read_dir(store.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
