//! Cycle controller — drives the extraction cycle for one target.
//!
//! Each cycle re-reads the target snapshot, computes a fresh plan, and
//! walks its schedule:
//!
//! ```text
//! Snapshot ─► Plan ─► Dispatch(S1) ─► Wait ─► Dispatch(G) ─► ... ─► Dispatch(H)
//!    ▲                                                                  │
//!    └────────────────────────── CompletionWindow ◄─────────────────────┘
//! ```
//!
//! Nothing carries over between cycles. If a stage ran long, the next
//! cycle's snapshot shows it and the plan corrects for it. A failed cycle is
//! logged and followed by the idle delay; the loop only ends on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use harvest_core::config::{CompletionConfig, Tunables};
use harvest_core::{HarvestConfig, PlanMode, TargetId};
use harvestgrid_planner::{Strategy, compute_plan};
use harvestgrid_state::SnapshotSource;

use crate::allocator::{Allocator, StageOutcome};
use crate::dispatch::{Dispatcher, ProcessHandle};
use crate::error::{SchedulerError, SchedulerResult};
use crate::schedule::{CycleStep, StageLaunch, build_schedule, completion_window};

/// How the controller decides a cycle's stages have finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Trust the duration estimates.
    Fixed,
    /// After the estimated window, poll launched jobs until they exit or
    /// `max_overrun` passes.
    Poll {
        interval: Duration,
        max_overrun: Duration,
    },
}

impl CompletionPolicy {
    pub fn from_config(config: &CompletionConfig) -> Self {
        if config.poll {
            CompletionPolicy::Poll {
                interval: Duration::from_millis(config.poll_interval_ms.max(1)),
                max_overrun: Duration::from_millis(config.max_overrun_ms),
            }
        } else {
            CompletionPolicy::Fixed
        }
    }
}

/// Everything a controller needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub tunables: Tunables,
    pub strategy: Strategy,
    pub idle_delay: Duration,
    pub completion: CompletionPolicy,
}

impl ControllerSettings {
    pub fn from_config(config: &HarvestConfig, mode: PlanMode) -> Self {
        Self {
            tunables: Tunables {
                mode,
                ..config.planner.clone()
            },
            strategy: Strategy::for_mode(mode, &config.pacing),
            idle_delay: Duration::from_millis(config.pacing.idle_delay_ms),
            completion: CompletionPolicy::from_config(&config.pacing.completion),
        }
    }
}

/// Counters shared with whoever is watching the controller.
#[derive(Debug, Default)]
pub struct ControllerStats {
    cycles: AtomicU64,
    idle_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    threads_started: AtomicU64,
    partial_stages: AtomicU64,
    exhausted_stages: AtomicU64,
    overruns: AtomicU64,
}

/// Point-in-time copy of [`ControllerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub failed_cycles: u64,
    pub threads_started: u64,
    pub partial_stages: u64,
    pub exhausted_stages: u64,
    pub overruns: u64,
}

impl ControllerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            threads_started: self.threads_started.load(Ordering::Relaxed),
            partial_stages: self.partial_stages.load(Ordering::Relaxed),
            exhausted_stages: self.exhausted_stages.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// What one call to [`CycleController::run_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleSummary {
    /// The plan had no jobs.
    Idle,
    Completed {
        started_threads: u64,
        partial_stages: u32,
        exhausted_stages: u32,
        overran: bool,
    },
}

pub struct CycleController {
    target: TargetId,
    snapshots: Arc<dyn SnapshotSource>,
    allocator: Arc<Allocator>,
    settings: ControllerSettings,
    stats: Arc<ControllerStats>,
}

impl CycleController {
    pub fn new(
        target: &str,
        snapshots: Arc<dyn SnapshotSource>,
        allocator: Arc<Allocator>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            target: target.to_string(),
            snapshots,
            allocator,
            settings,
            stats: Arc::new(ControllerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ControllerStats> {
        Arc::clone(&self.stats)
    }

    /// Run cycles until `shutdown` fires (or once, for a non-repeating
    /// strategy).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            target = %self.target,
            mode = self.settings.strategy.mode.label(),
            "cycle controller started"
        );

        loop {
            let result = tokio::select! {
                result = self.run_once() => result,
                _ = shutdown.changed() => break,
            };

            let pause = match result {
                Ok(CycleSummary::Completed { .. }) => Duration::ZERO,
                Ok(CycleSummary::Idle) => self.settings.idle_delay,
                Err(e) => {
                    ControllerStats::bump(&self.stats.failed_cycles, 1);
                    if e.is_missing_input() {
                        warn!(target = %self.target, error = %e, "cycle skipped");
                    } else {
                        error!(target = %self.target, error = %e, "cycle failed");
                    }
                    self.settings.idle_delay
                }
            };

            if !self.settings.strategy.repeat {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(target = %self.target, cycles = self.stats.cycles(), "cycle controller stopped");
    }

    /// Run a single cycle against a fresh snapshot.
    pub async fn run_once(&self) -> SchedulerResult<CycleSummary> {
        let snapshot = self.snapshots.snapshot(&self.target)?;
        let plan = compute_plan(&snapshot, &self.settings.tunables);
        ControllerStats::bump(&self.stats.cycles, 1);

        let steps = build_schedule(&plan, &self.settings.strategy.pacing);
        if steps.is_empty() {
            ControllerStats::bump(&self.stats.idle_cycles, 1);
            debug!(target = %self.target, "nothing to dispatch");
            return Ok(CycleSummary::Idle);
        }

        let start = Instant::now();
        let mut launches: Vec<StageLaunch> = Vec::new();
        let mut handles: Vec<ProcessHandle> = Vec::new();
        let mut started_threads = 0u64;
        let mut partial_stages = 0u32;
        let mut exhausted_stages = 0u32;
        let mut overran = false;
        let mut first_error: Option<SchedulerError> = None;

        for step in steps {
            match step {
                CycleStep::Dispatch(job) => {
                    let offset = start.elapsed();
                    let outcome = match self.allocator.allocate(&job, &snapshot).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            // Earlier stages may already be running; keep
                            // walking so their window is still honored.
                            error!(
                                target = %self.target,
                                phase = job.phase.label(),
                                error = %e,
                                "stage allocation failed"
                            );
                            exhausted_stages += 1;
                            first_error.get_or_insert(e);
                            continue;
                        }
                    };
                    match &outcome {
                        StageOutcome::Exhausted { .. } => exhausted_stages += 1,
                        StageOutcome::Partial(_) => partial_stages += 1,
                        StageOutcome::Complete(_) => {}
                    }
                    let started = outcome.started_threads();
                    if started > 0 {
                        started_threads += u64::from(started);
                        launches.push(StageLaunch {
                            phase: job.phase,
                            offset,
                            duration: job.estimated_duration(),
                        });
                        handles.extend_from_slice(outcome.handles());
                    }
                }
                CycleStep::Delay(delay) => tokio::time::sleep(delay).await,
                CycleStep::AwaitStage { phase, wait } => {
                    if launches.last().is_some_and(|l| l.phase == phase) {
                        tokio::time::sleep(wait).await;
                    }
                }
                CycleStep::CompletionWindow => {
                    let expected = completion_window(&launches, start.elapsed(), Duration::ZERO);
                    debug!(
                        target = %self.target,
                        window_ms = expected.as_millis() as u64,
                        "awaiting completion window"
                    );
                    tokio::time::sleep(expected).await;

                    if let CompletionPolicy::Poll {
                        interval,
                        max_overrun,
                    } = self.settings.completion
                    {
                        overran = !await_handles(
                            self.allocator.dispatcher().as_ref(),
                            &handles,
                            interval,
                            max_overrun,
                        )
                        .await;
                        if overran {
                            warn!(
                                target = %self.target,
                                max_overrun_ms = max_overrun.as_millis() as u64,
                                "stages still running past their estimate; starting next cycle"
                            );
                        }
                    }

                    tokio::time::sleep(self.settings.strategy.pacing.cycle_delay()).await;
                }
            }
        }

        ControllerStats::bump(&self.stats.threads_started, started_threads);
        ControllerStats::bump(&self.stats.partial_stages, u64::from(partial_stages));
        ControllerStats::bump(&self.stats.exhausted_stages, u64::from(exhausted_stages));
        if overran {
            ControllerStats::bump(&self.stats.overruns, 1);
        }

        if started_threads == 0
            && let Some(e) = first_error
        {
            return Err(e);
        }

        info!(
            target = %self.target,
            decision = ?plan.decision,
            planned_threads = plan.total_threads(),
            started_threads,
            partial_stages,
            exhausted_stages,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cycle complete"
        );

        Ok(CycleSummary::Completed {
            started_threads,
            partial_stages,
            exhausted_stages,
            overran,
        })
    }
}

/// Poll until no handle is running. Returns false if `max_overrun` passed
/// first.
async fn await_handles(
    dispatcher: &dyn Dispatcher,
    handles: &[ProcessHandle],
    interval: Duration,
    max_overrun: Duration,
) -> bool {
    let deadline = Instant::now() + max_overrun;
    let mut pending: Vec<&ProcessHandle> = handles.iter().collect();

    loop {
        let mut still_running = Vec::with_capacity(pending.len());
        for handle in pending {
            if dispatcher.is_running(handle).await {
                still_running.push(handle);
            }
        }
        if still_running.is_empty() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        pending = still_running;
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_policy_follows_config() {
        assert_eq!(
            CompletionPolicy::from_config(&CompletionConfig::default()),
            CompletionPolicy::Fixed
        );
        let polled = CompletionPolicy::from_config(&CompletionConfig {
            poll: true,
            poll_interval_ms: 0,
            max_overrun_ms: 750,
        });
        assert_eq!(
            polled,
            CompletionPolicy::Poll {
                interval: Duration::from_millis(1),
                max_overrun: Duration::from_millis(750),
            }
        );
    }

    #[test]
    fn settings_apply_mode_override() {
        let config = HarvestConfig::default();
        let settings = ControllerSettings::from_config(&config, PlanMode::Batch);
        assert_eq!(settings.tunables.mode, PlanMode::Batch);
        assert_eq!(settings.strategy.mode, PlanMode::Batch);
        assert_eq!(settings.idle_delay, Duration::from_millis(500));
    }

    #[test]
    fn stats_start_at_zero() {
        let stats = ControllerStats::default();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
