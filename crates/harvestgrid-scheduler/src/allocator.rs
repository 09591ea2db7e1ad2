//! Live allocator — packs a job onto the fleet and dispatches as it goes.
//!
//! Uses the same candidate order and per-node arithmetic as
//! [`harvestgrid_placement::pack`], but a node only counts once its payload
//! is placed and its job launched. A failure on one node leaves those
//! threads unassigned and moves on to the next candidate.

use std::sync::Arc;

use tracing::{debug, error, warn};

use harvest_core::config::PayloadsConfig;
use harvest_core::{Job, JobFragment, TargetSnapshot};
use harvestgrid_placement::{
    AllocationOutcome, AllocationReport, CandidatePolicy, candidate_order, threads_for_node,
};
use harvestgrid_state::FleetInventory;

use crate::dispatch::{Dispatcher, ProcessHandle};
use crate::error::SchedulerResult;
use crate::ledger::CapacityLedger;
use crate::retry::RetryPolicy;

/// Fragments dispatched for one stage, with their handles.
#[derive(Debug, Clone)]
pub struct StageDispatch {
    pub report: AllocationReport,
    pub handles: Vec<ProcessHandle>,
}

impl StageDispatch {
    fn absorb(&mut self, other: StageDispatch) {
        self.report.absorb(other.report);
        self.handles.extend(other.handles);
    }
}

/// Final result of allocating a stage, after any retries.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Complete(StageDispatch),
    Partial(StageDispatch),
    /// No thread found capacity within the retry budget.
    Exhausted { requested: u32, attempts: u32 },
}

impl StageOutcome {
    pub fn started_threads(&self) -> u32 {
        match self {
            StageOutcome::Complete(d) | StageOutcome::Partial(d) => d.report.started_threads,
            StageOutcome::Exhausted { .. } => 0,
        }
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        match self {
            StageOutcome::Complete(d) | StageOutcome::Partial(d) => &d.handles,
            StageOutcome::Exhausted { .. } => &[],
        }
    }
}

pub struct Allocator {
    inventory: Arc<dyn FleetInventory>,
    dispatcher: Arc<dyn Dispatcher>,
    ledger: Arc<CapacityLedger>,
    policy: CandidatePolicy,
    payloads: PayloadsConfig,
    retry: RetryPolicy,
    force: bool,
}

impl Allocator {
    pub fn new(
        inventory: Arc<dyn FleetInventory>,
        dispatcher: Arc<dyn Dispatcher>,
        ledger: Arc<CapacityLedger>,
        policy: CandidatePolicy,
        payloads: PayloadsConfig,
    ) -> Self {
        Self {
            inventory,
            dispatcher,
            ledger,
            policy,
            payloads,
            retry: RetryPolicy::none(),
            force: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Re-place payloads even when an identical copy is present.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Allocate `job`, backing off and retrying while it finds no capacity.
    ///
    /// Errors only when the first pass cannot read the fleet, in which case
    /// nothing was dispatched.
    pub async fn allocate(
        &self,
        job: &Job,
        snapshot: &TargetSnapshot,
    ) -> SchedulerResult<StageOutcome> {
        let mut attempt = 1;
        let mut dispatched = self.allocate_once(job, snapshot).await?;

        loop {
            let outcome = dispatched.report.outcome();
            let retry = match outcome {
                AllocationOutcome::Complete => false,
                AllocationOutcome::Exhausted => true,
                AllocationOutcome::Partial => self.retry.retry_partial,
            };
            if !retry || !self.retry.has_attempts_left(attempt) {
                break;
            }

            let wait = self.retry.backoff(attempt);
            warn!(
                target = %job.target,
                phase = job.phase.label(),
                attempt,
                remaining = dispatched.report.remaining_unallocated,
                backoff_ms = wait.as_millis() as u64,
                "stage short of capacity, backing off"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;

            let rest = Job {
                requested_threads: dispatched.report.remaining_unallocated,
                ..job.clone()
            };
            match self.allocate_once(&rest, snapshot).await {
                Ok(more) => dispatched.absorb(more),
                Err(e) => {
                    // Fragments from earlier passes are already running.
                    error!(
                        target = %job.target,
                        phase = job.phase.label(),
                        attempt,
                        error = %e,
                        "retry failed, keeping earlier fragments"
                    );
                    break;
                }
            }
        }

        let report = &dispatched.report;
        Ok(match report.outcome() {
            AllocationOutcome::Complete => {
                debug!(
                    target = %job.target,
                    phase = job.phase.label(),
                    threads = report.started_threads,
                    nodes = report.fragments.len(),
                    "stage dispatched"
                );
                StageOutcome::Complete(dispatched)
            }
            AllocationOutcome::Partial => {
                warn!(
                    target = %job.target,
                    phase = job.phase.label(),
                    started = report.started_threads,
                    requested = job.requested_threads,
                    remaining = report.remaining_unallocated,
                    "partial allocation"
                );
                StageOutcome::Partial(dispatched)
            }
            AllocationOutcome::Exhausted => {
                error!(
                    target = %job.target,
                    phase = job.phase.label(),
                    requested = job.requested_threads,
                    attempts = attempt,
                    "no capacity for stage"
                );
                StageOutcome::Exhausted {
                    requested: job.requested_threads,
                    attempts: attempt,
                }
            }
        })
    }

    /// One pass over the candidates. Holds the ledger for the whole pass.
    pub async fn allocate_once(
        &self,
        job: &Job,
        snapshot: &TargetSnapshot,
    ) -> SchedulerResult<StageDispatch> {
        let mut ledger = self.ledger.lock().await;
        let nodes = ledger.apply(self.inventory.nodes()?);
        let candidates = candidate_order(snapshot, &self.policy, &nodes);

        let payload = self.payloads.for_stage(job.stage);
        let args = [job.target.clone()];
        let hold = job.estimated_duration();

        let mut report = AllocationReport::empty(job);
        let mut handles = Vec::new();

        for node in &candidates {
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

            if let Err(e) = self.dispatcher.place(payload, &node.id, self.force).await {
                warn!(node = %node.id, %payload, error = %e, "payload placement failed");
                continue;
            }
            let handle = match self
                .dispatcher
                .launch(payload, &node.id, threads, &args)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(node = %node.id, %payload, threads, error = %e, "launch failed");
                    continue;
                }
            };

            let fragment = JobFragment {
                phase: job.phase,
                node: node.id.clone(),
                threads_assigned: threads,
                per_thread_cost: job.per_thread_cost,
            };
            ledger.reserve(&node.id, fragment.capacity(), hold);
            debug!(
                target = %job.target,
                node = %node.id,
                phase = job.phase.label(),
                stage = job.stage.label(),
                threads,
                "fragment dispatched"
            );
            report.push(fragment);
            handles.push(handle);
        }

        Ok(StageDispatch { report, handles })
    }
}
