//! Cycle schedule — the ordered steps of one cycle, computed up front.
//!
//! A schedule is a pure function of the plan and the pacing, so the timing
//! of every mode can be checked without running anything:
//!
//! ```text
//! Offset:      Dispatch(S1) Delay Dispatch(G) Delay Dispatch(S2) Delay Dispatch(H) CompletionWindow
//! Sequential:  Dispatch(S1) AwaitStage Dispatch(G) AwaitStage ... Dispatch(H) AwaitStage CompletionWindow
//! ```

use std::time::Duration;

use harvest_core::{Job, Phase};
use harvestgrid_planner::{Pacing, Plan};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleStep {
    Dispatch(Job),
    /// Fixed offset before the next launch.
    Delay(Duration),
    /// Wait out a launched stage before the next one.
    AwaitStage { phase: Phase, wait: Duration },
    /// Wait until every dispatched stage should have finished.
    CompletionWindow,
}

/// When a dispatched stage started, relative to the cycle start, and how
/// long it is expected to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLaunch {
    pub phase: Phase,
    pub offset: Duration,
    pub duration: Duration,
}

impl StageLaunch {
    pub fn expected_end(&self) -> Duration {
        self.offset + self.duration
    }
}

/// Steps for one cycle. Empty when the plan has no jobs.
pub fn build_schedule(plan: &Plan, pacing: &Pacing) -> Vec<CycleStep> {
    if plan.is_empty() {
        return Vec::new();
    }

    let mut steps = Vec::with_capacity(plan.jobs.len() * 2 + 1);
    match pacing {
        Pacing::Offset { stage_delay, .. } => {
            for (i, job) in plan.jobs.iter().enumerate() {
                if i > 0 && !stage_delay.is_zero() {
                    steps.push(CycleStep::Delay(*stage_delay));
                }
                steps.push(CycleStep::Dispatch(job.clone()));
            }
        }
        Pacing::Sequential { padding, .. } => {
            for job in &plan.jobs {
                steps.push(CycleStep::Dispatch(job.clone()));
                steps.push(CycleStep::AwaitStage {
                    phase: job.phase,
                    wait: job.estimated_duration() + *padding,
                });
            }
        }
    }
    steps.push(CycleStep::CompletionWindow);
    steps
}

/// Remaining wait at the end of a cycle: the latest expected stage end,
/// less time already spent, plus the cycle delay.
pub fn completion_window(
    launches: &[StageLaunch],
    elapsed: Duration,
    cycle_delay: Duration,
) -> Duration {
    let latest = launches
        .iter()
        .map(StageLaunch::expected_end)
        .max()
        .unwrap_or(Duration::ZERO);
    latest.saturating_sub(elapsed) + cycle_delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{PlanMode, Stage};
    use harvestgrid_planner::Decision;

    fn job(phase: Phase, ms: f64) -> Job {
        Job {
            phase,
            stage: phase.stage(),
            target: "phantasy".to_string(),
            requested_threads: 10,
            per_thread_cost: 1.75,
            duration_ms: ms,
        }
    }

    fn plan(jobs: Vec<Job>) -> Plan {
        Plan {
            target: "phantasy".to_string(),
            mode: PlanMode::Batch,
            decision: Decision::Batch,
            jobs,
            degenerate: Vec::new(),
        }
    }

    fn offset() -> Pacing {
        Pacing::Offset {
            stage_delay: Duration::from_millis(50),
            cycle_delay: Duration::from_millis(200),
        }
    }

    #[test]
    fn offset_pacing_spaces_launches() {
        let p = plan(vec![job(Phase::Stabilize2, 4_000.0), job(Phase::Harvest, 1_000.0)]);

        let steps = build_schedule(&p, &offset());

        assert_eq!(steps.len(), 4);
        assert!(matches!(&steps[0], CycleStep::Dispatch(j) if j.phase == Phase::Stabilize2));
        assert_eq!(steps[1], CycleStep::Delay(Duration::from_millis(50)));
        assert!(matches!(&steps[2], CycleStep::Dispatch(j) if j.stage == Stage::Harvest));
        assert_eq!(steps[3], CycleStep::CompletionWindow);
    }

    #[test]
    fn sequential_pacing_waits_out_each_stage() {
        let p = plan(vec![job(Phase::Grow, 3_200.0), job(Phase::Harvest, 1_000.0)]);
        let pacing = Pacing::Sequential {
            padding: Duration::from_millis(100),
            cycle_delay: Duration::ZERO,
        };

        let steps = build_schedule(&p, &pacing);

        assert_eq!(
            steps[1],
            CycleStep::AwaitStage {
                phase: Phase::Grow,
                wait: Duration::from_millis(3_300),
            }
        );
        assert_eq!(
            steps[3],
            CycleStep::AwaitStage {
                phase: Phase::Harvest,
                wait: Duration::from_millis(1_100),
            }
        );
        assert_eq!(steps.last(), Some(&CycleStep::CompletionWindow));
    }

    #[test]
    fn empty_plan_has_no_steps() {
        assert!(build_schedule(&plan(Vec::new()), &offset()).is_empty());
    }

    #[test]
    fn window_covers_longest_stage() {
        let launches = [
            StageLaunch {
                phase: Phase::Stabilize2,
                offset: Duration::ZERO,
                duration: Duration::from_millis(4_000),
            },
            StageLaunch {
                phase: Phase::Harvest,
                offset: Duration::from_millis(50),
                duration: Duration::from_millis(1_000),
            },
        ];

        let window = completion_window(
            &launches,
            Duration::from_millis(60),
            Duration::from_millis(200),
        );
        assert_eq!(window, Duration::from_millis(4_140));
    }

    #[test]
    fn window_never_goes_negative() {
        let launches = [StageLaunch {
            phase: Phase::Harvest,
            offset: Duration::ZERO,
            duration: Duration::from_millis(100),
        }];
        let window = completion_window(&launches, Duration::from_secs(5), Duration::from_millis(200));
        assert_eq!(window, Duration::from_millis(200));
        assert_eq!(
            completion_window(&[], Duration::ZERO, Duration::from_millis(200)),
            Duration::from_millis(200)
        );
    }
}
