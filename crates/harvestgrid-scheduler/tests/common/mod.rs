//! Shared fixtures: an in-memory fleet and a dispatcher that records
//! instead of spawning.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use harvest_core::config::PayloadsConfig;
use harvest_core::{TargetSnapshot, WorkerNode};
use harvestgrid_placement::CandidatePolicy;
use harvestgrid_scheduler::{
    Allocator, BoxFuture, CapacityLedger, DispatchError, DispatchResult, Dispatcher, ProcessHandle,
};
use harvestgrid_state::{FleetInventory, SnapshotSource, StateError, StateResult};

// ── State ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryState {
    snapshots: Mutex<HashMap<String, TargetSnapshot>>,
    fleet: Mutex<Vec<WorkerNode>>,
    /// The first `blackout` fleet reads return no nodes.
    blackout: usize,
    /// Fleet reads (by index) that fail outright.
    failing: HashSet<usize>,
    fleet_reads: AtomicUsize,
}

impl MemoryState {
    pub fn new(fleet: Vec<WorkerNode>) -> Self {
        Self {
            fleet: Mutex::new(fleet),
            ..Self::default()
        }
    }

    pub fn with_blackout(mut self, reads: usize) -> Self {
        self.blackout = reads;
        self
    }

    /// The `read`-th fleet read (zero-based) returns an error.
    pub fn failing_read(mut self, read: usize) -> Self {
        self.failing.insert(read);
        self
    }

    pub fn put(&self, snapshot: TargetSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.target.clone(), snapshot);
    }

    pub fn fleet_reads(&self) -> usize {
        self.fleet_reads.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MemoryState {
    fn snapshot(&self, target: &str) -> StateResult<TargetSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .ok_or_else(|| StateError::NotFound(target.to_string()))
    }
}

impl FleetInventory for MemoryState {
    fn nodes(&self) -> StateResult<Vec<WorkerNode>> {
        let read = self.fleet_reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&read) {
            return Err(StateError::Corrupt {
                path: "fleet.json".into(),
                reason: "truncated".to_string(),
            });
        }
        if read < self.blackout {
            return Ok(Vec::new());
        }
        Ok(self.fleet.lock().unwrap().clone())
    }
}

// ── Dispatcher ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Launch {
    pub id: u64,
    pub payload: String,
    pub node: String,
    pub threads: u32,
    pub args: Vec<String>,
    pub at: Instant,
}

pub struct SimDispatcher {
    launches: Mutex<Vec<Launch>>,
    placements: Mutex<Vec<(String, String, bool)>>,
    refuse: HashSet<String>,
    /// How long a launched job reports itself running.
    run_for: Duration,
    next_id: AtomicU64,
}

impl SimDispatcher {
    pub fn new() -> Self {
        Self {
            launches: Mutex::new(Vec::new()),
            placements: Mutex::new(Vec::new()),
            refuse: HashSet::new(),
            run_for: Duration::ZERO,
            next_id: AtomicU64::new(1),
        }
    }

    /// Launches on `node` fail.
    pub fn refusing(mut self, node: &str) -> Self {
        self.refuse.insert(node.to_string());
        self
    }

    pub fn running_for(mut self, run_for: Duration) -> Self {
        self.run_for = run_for;
        self
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().unwrap().clone()
    }

    pub fn placements(&self) -> Vec<(String, String, bool)> {
        self.placements.lock().unwrap().clone()
    }
}

impl Dispatcher for SimDispatcher {
    fn place<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        overwrite: bool,
    ) -> BoxFuture<'a, DispatchResult<bool>> {
        Box::pin(async move {
            self.placements
                .lock()
                .unwrap()
                .push((payload.to_string(), node.to_string(), overwrite));
            Ok(true)
        })
    }

    fn launch<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        threads: u32,
        args: &'a [String],
    ) -> BoxFuture<'a, DispatchResult<ProcessHandle>> {
        Box::pin(async move {
            if self.refuse.contains(node) {
                return Err(DispatchError::Launch {
                    program: "sim".to_string(),
                    source: std::io::Error::other("refused"),
                });
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.launches.lock().unwrap().push(Launch {
                id,
                payload: payload.to_string(),
                node: node.to_string(),
                threads,
                args: args.to_vec(),
                at: Instant::now(),
            });
            Ok(ProcessHandle {
                id,
                node: node.to_string(),
                payload: payload.to_string(),
                threads,
            })
        })
    }

    fn is_running<'a>(&'a self, handle: &'a ProcessHandle) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let launches = self.launches.lock().unwrap();
            launches
                .iter()
                .find(|l| l.id == handle.id)
                .is_some_and(|l| l.at + self.run_for > Instant::now())
        })
    }
}

// ── Builders ───────────────────────────────────────────────────────

/// A target at floor defense and full value, served by `home` and `pool-1`.
pub fn snapshot(target: &str) -> TargetSnapshot {
    TargetSnapshot {
        target: target.to_string(),
        defense_level: 5.0,
        min_defense: 5.0,
        value: 40_000.0,
        max_value: 40_000.0,
        weaken_effect_per_thread: 0.05,
        harvest_yield_per_thread: 0.005,
        growth_security_per_thread: 0.004,
        harvest_security_per_thread: 0.002,
        growth_multiplier_per_thread: 1.02,
        stabilize_cost: 1.75,
        grow_cost: 1.75,
        harvest_cost: 1.7,
        stabilize_ms: 4_000.0,
        grow_ms: 3_200.0,
        harvest_ms: 1_000.0,
        worker_pool: vec!["pool-1".to_string()],
        auxiliary_nodes: Vec::new(),
        required_skill: 0,
        operator_skill: 0,
        accessible: true,
        captured_at: 0,
    }
}

pub fn allocator(
    state: Arc<MemoryState>,
    dispatcher: Arc<SimDispatcher>,
    ledger: Arc<CapacityLedger>,
) -> Allocator {
    Allocator::new(
        state,
        dispatcher,
        ledger,
        CandidatePolicy::default(),
        PayloadsConfig::default(),
    )
}
