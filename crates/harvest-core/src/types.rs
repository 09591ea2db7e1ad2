//! Shared types used across HarvestGrid crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a target entity.
pub type TargetId = String;

/// Identifier of a worker node in the fleet.
pub type NodeId = String;

// ── Stages ─────────────────────────────────────────────────────────

/// Kind of work a thread performs against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Lowers defense toward its floor.
    Stabilize,
    /// Raises value toward its ceiling (adds defense).
    Grow,
    /// Extracts a fraction of value (adds defense).
    Harvest,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Stabilize => "stabilize",
            Stage::Grow => "grow",
            Stage::Harvest => "harvest",
        }
    }
}

/// A slot in the fixed cycle order `Stabilize1 → Grow → Stabilize2 → Harvest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stabilize1,
    Grow,
    Stabilize2,
    Harvest,
}

impl Phase {
    /// Dispatch order within one cycle.
    pub const ORDER: [Phase; 4] = [
        Phase::Stabilize1,
        Phase::Grow,
        Phase::Stabilize2,
        Phase::Harvest,
    ];

    pub fn stage(&self) -> Stage {
        match self {
            Phase::Stabilize1 | Phase::Stabilize2 => Stage::Stabilize,
            Phase::Grow => Stage::Grow,
            Phase::Harvest => Stage::Harvest,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Stabilize1 => "stabilize-1",
            Phase::Grow => "grow",
            Phase::Stabilize2 => "stabilize-2",
            Phase::Harvest => "harvest",
        }
    }
}

/// Which scheduling variant drives plan computation and pacing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Priority policy: stabilize, else grow, else harvest.
    #[default]
    Threshold,
    /// Full four-slot batch every cycle.
    Batch,
    /// One-shot harvest of the entire value.
    Drain,
}

impl PlanMode {
    pub fn label(&self) -> &'static str {
        match self {
            PlanMode::Threshold => "threshold",
            PlanMode::Batch => "batch",
            PlanMode::Drain => "drain",
        }
    }
}

impl std::str::FromStr for PlanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(PlanMode::Threshold),
            "batch" => Ok(PlanMode::Batch),
            "drain" => Ok(PlanMode::Drain),
            other => Err(format!("unknown plan mode: {other}")),
        }
    }
}

// ── Target ─────────────────────────────────────────────────────────

/// Point-in-time record of a target's metrics and static constants.
///
/// Written by the external snapshot provider, read once per cycle. The
/// scheduler never mutates a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub target: TargetId,
    /// Current defense level.
    pub defense_level: f64,
    /// Defense floor.
    pub min_defense: f64,
    /// Current extractable amount.
    pub value: f64,
    /// Value ceiling.
    pub max_value: f64,
    /// Defense removed by one stabilize thread.
    pub weaken_effect_per_thread: f64,
    /// Fraction of value extracted by one harvest thread.
    pub harvest_yield_per_thread: f64,
    /// Defense added by one grow thread.
    pub growth_security_per_thread: f64,
    /// Defense added by one harvest thread.
    #[serde(default = "default_harvest_security")]
    pub harvest_security_per_thread: f64,
    /// Multiplicative value growth contributed by one grow thread.
    pub growth_multiplier_per_thread: f64,
    /// Capacity cost of one thread, per stage.
    pub stabilize_cost: f64,
    pub grow_cost: f64,
    pub harvest_cost: f64,
    /// Estimated stage durations in milliseconds.
    pub stabilize_ms: f64,
    pub grow_ms: f64,
    pub harvest_ms: f64,
    /// Dedicated worker-pool nodes.
    #[serde(default)]
    pub worker_pool: Vec<NodeId>,
    /// Other nodes with spare capacity that may run jobs.
    #[serde(default)]
    pub auxiliary_nodes: Vec<NodeId>,
    /// Skill needed before this target can be worked.
    #[serde(default)]
    pub required_skill: u32,
    /// Operator skill at capture time.
    #[serde(default)]
    pub operator_skill: u32,
    #[serde(default = "default_true")]
    pub accessible: bool,
    /// Unix seconds when the provider captured this record.
    #[serde(default)]
    pub captured_at: u64,
}

fn default_harvest_security() -> f64 {
    0.002
}

fn default_true() -> bool {
    true
}

impl TargetSnapshot {
    /// Capacity cost of a single thread of `stage`.
    pub fn cost_for(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Stabilize => self.stabilize_cost,
            Stage::Grow => self.grow_cost,
            Stage::Harvest => self.harvest_cost,
        }
    }

    /// Estimated duration of `stage` in milliseconds.
    pub fn duration_ms(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Stabilize => self.stabilize_ms,
            Stage::Grow => self.grow_ms,
            Stage::Harvest => self.harvest_ms,
        }
    }

    /// Defense above the floor (never negative).
    pub fn excess_defense(&self) -> f64 {
        (self.defense_level - self.min_defense).max(0.0)
    }
}

// ── Fleet ──────────────────────────────────────────────────────────

/// A capacity-bearing node that executes stage jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: NodeId,
    pub total_capacity: f64,
    pub used_capacity: f64,
}

impl WorkerNode {
    pub fn new(id: &str, total_capacity: f64, used_capacity: f64) -> Self {
        Self {
            id: id.to_string(),
            total_capacity,
            used_capacity,
        }
    }

    /// Capacity not yet in use. Derived, never stored.
    pub fn free_capacity(&self) -> f64 {
        (self.total_capacity - self.used_capacity).max(0.0)
    }
}

// ── Jobs ───────────────────────────────────────────────────────────

/// Threads required for one cycle slot against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub phase: Phase,
    pub stage: Stage,
    pub target: TargetId,
    pub requested_threads: u32,
    pub per_thread_cost: f64,
    /// Estimated run time of one thread of this job, in milliseconds.
    pub duration_ms: f64,
}

impl Job {
    pub fn estimated_duration(&self) -> Duration {
        duration_from_ms(self.duration_ms)
    }
}

/// The share of a job assigned to a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFragment {
    pub phase: Phase,
    pub node: NodeId,
    pub threads_assigned: u32,
    pub per_thread_cost: f64,
}

impl JobFragment {
    /// Capacity this fragment consumes on its node.
    pub fn capacity(&self) -> f64 {
        f64::from(self.threads_assigned) * self.per_thread_cost
    }
}

// ── Selection ──────────────────────────────────────────────────────

/// A scored entry in the ranked-target file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTarget {
    pub target: TargetId,
    pub score: f64,
}

/// Convert a millisecond estimate (possibly fractional or bogus) to a `Duration`.
pub fn duration_from_ms(ms: f64) -> Duration {
    if !(ms.is_finite() && ms > 0.0) {
        return Duration::ZERO;
    }
    let nanos = (ms * 1_000_000.0).round();
    if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
