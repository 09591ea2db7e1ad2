//! Greedy packer — fills candidates in order until the job is placed.
//!
//! Each node takes `min(remaining, floor(free / per_thread_cost))` threads.
//! A node that cannot fit a single thread is passed over. The packer never
//! places more threads than requested and never more than a node can hold.

use serde::Serialize;
use tracing::{debug, warn};

use harvest_core::{Job, JobFragment, Phase, WorkerNode};

/// How much of a job found capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOutcome {
    /// Every requested thread was placed (or none were requested).
    Complete,
    /// Some but not all threads were placed.
    Partial,
    /// Threads were requested but none were placed.
    Exhausted,
}

/// Result of allocating one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationReport {
    pub phase: Phase,
    pub requested_threads: u32,
    pub fragments: Vec<JobFragment>,
    pub started_threads: u32,
    pub remaining_unallocated: u32,
}

impl AllocationReport {
    pub fn empty(job: &Job) -> Self {
        Self {
            phase: job.phase,
            requested_threads: job.requested_threads,
            fragments: Vec::new(),
            started_threads: 0,
            remaining_unallocated: job.requested_threads,
        }
    }

    /// Record a fragment and update the running totals.
    pub fn push(&mut self, fragment: JobFragment) {
        self.started_threads += fragment.threads_assigned;
        self.remaining_unallocated = self
            .remaining_unallocated
            .saturating_sub(fragment.threads_assigned);
        self.fragments.push(fragment);
    }

    /// Fold a follow-up allocation for the same job into this one.
    pub fn absorb(&mut self, other: AllocationReport) {
        for fragment in other.fragments {
            self.push(fragment);
        }
    }

    pub fn outcome(&self) -> AllocationOutcome {
        if self.remaining_unallocated == 0 {
            AllocationOutcome::Complete
        } else if self.started_threads == 0 {
            AllocationOutcome::Exhausted
        } else {
            AllocationOutcome::Partial
        }
    }
}

/// Threads a node with `free_capacity` can take toward `remaining`.
pub fn threads_for_node(remaining: u32, free_capacity: f64, per_thread_cost: f64) -> u32 {
    if remaining == 0
        || !(per_thread_cost.is_finite() && per_thread_cost > 0.0)
        || !(free_capacity.is_finite() && free_capacity > 0.0)
    {
        return 0;
    }
    let fit = (free_capacity / per_thread_cost).floor();
    if fit >= f64::from(remaining) {
        remaining
    } else {
        fit as u32
    }
}

/// Pack `job` onto `candidates`, in order, against their free capacity.
pub fn pack(job: &Job, candidates: &[WorkerNode]) -> AllocationReport {
    let mut report = AllocationReport::empty(job);

    for node in candidates {
        if report.remaining_unallocated == 0 {
            break;
        }
        let threads = threads_for_node(
            report.remaining_unallocated,
            node.free_capacity(),
            job.per_thread_cost,
        );
        if threads == 0 {
            continue;
        }
        debug!(
            node = %node.id,
            phase = job.phase.label(),
            threads,
            free = node.free_capacity(),
            "packed threads"
        );
        report.push(JobFragment {
            phase: job.phase,
            node: node.id.clone(),
            threads_assigned: threads,
            per_thread_cost: job.per_thread_cost,
        });
    }

    if report.outcome() != AllocationOutcome::Complete {
        warn!(
            target = %job.target,
            phase = job.phase.label(),
            requested = job.requested_threads,
            remaining = report.remaining_unallocated,
            "fleet short of capacity; threads left unallocated"
        );
    }

    report
}
