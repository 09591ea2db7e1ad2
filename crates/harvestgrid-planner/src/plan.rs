//! Plan calculator — converts a target snapshot into per-slot thread counts.
//!
//! One calculator serves every [`PlanMode`]:
//!
//! - **Threshold**: stabilize if defense is above floor + slack, else grow
//!   if value is below the threshold, else harvest. Grow and harvest carry a
//!   corrective stabilize in the `Stabilize2` slot.
//! - **Batch**: all four slots every cycle, sized so the batch leaves the
//!   target at floor defense and full value.
//! - **Drain**: harvest the whole value once.
//!
//! Counts always round up and never go negative. A constant that makes a
//! stage impossible forces that stage to zero and raises a [`Degenerate`]
//! flag; it is never an error.

use serde::Serialize;
use tracing::{debug, warn};

use harvest_core::config::Tunables;
use harvest_core::{Job, Phase, PlanMode, Stage, TargetId, TargetSnapshot};

/// Slack for float noise when rounding thread counts up, so that an exact
/// quotient such as `5 / 0.05` does not become 101.
const CEIL_TOLERANCE: f64 = 1e-9;

/// A per-thread constant that makes a stage impossible this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degenerate {
    /// `harvest_yield_per_thread ≤ 0`: extraction not yet viable.
    HarvestYield,
    /// `weaken_effect_per_thread ≤ 0`: defense cannot be lowered.
    WeakenEffect,
    /// `growth_multiplier_per_thread ≤ 1`: value cannot be raised.
    GrowthMultiplier,
    /// Non-positive or non-finite per-thread capacity cost.
    ThreadCost(Stage),
}

/// Which branch of the policy produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Stabilize,
    Grow,
    Harvest,
    Batch,
    Drain,
}

/// Ordered jobs for one cycle against one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub target: TargetId,
    pub mode: PlanMode,
    pub decision: Decision,
    /// Jobs in cycle order. Zero-thread slots are omitted.
    pub jobs: Vec<Job>,
    pub degenerate: Vec<Degenerate>,
}

impl Plan {
    /// Threads planned for `phase` (0 when the slot is empty).
    pub fn threads(&self, phase: Phase) -> u32 {
        self.jobs
            .iter()
            .find(|j| j.phase == phase)
            .map_or(0, |j| j.requested_threads)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn total_threads(&self) -> u64 {
        self.jobs.iter().map(|j| u64::from(j.requested_threads)).sum()
    }
}

/// Compute the plan for `snapshot` under `tunables`.
pub fn compute_plan(snapshot: &TargetSnapshot, tunables: &Tunables) -> Plan {
    let mut draft = Draft::new(snapshot);

    let decision = match tunables.mode {
        PlanMode::Threshold => draft.threshold(tunables),
        PlanMode::Batch => draft.batch(tunables),
        PlanMode::Drain => draft.drain(),
    };

    let plan = draft.finish(tunables.mode, decision);

    for flag in &plan.degenerate {
        warn!(target = %plan.target, ?flag, "stage forced to zero threads");
    }
    debug!(
        target = %plan.target,
        mode = tunables.mode.label(),
        ?decision,
        stabilize_1 = plan.threads(Phase::Stabilize1),
        grow = plan.threads(Phase::Grow),
        stabilize_2 = plan.threads(Phase::Stabilize2),
        harvest = plan.threads(Phase::Harvest),
        "plan computed"
    );

    plan
}

/// Round a thread requirement up, clamping to `0..=u32::MAX`.
pub fn ceil_threads(required: f64) -> u32 {
    if !required.is_finite() || required <= 0.0 {
        return 0;
    }
    // Float noise just above a whole count snaps down to it; any other
    // positive requirement, however small, needs at least one thread.
    let nearest = required.round();
    let rounded = if nearest >= 1.0 && (required - nearest).abs() <= CEIL_TOLERANCE {
        nearest
    } else {
        required.ceil()
    };
    if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// Growth threads needed to multiply value by `multiplier`.
pub fn growth_threads(multiplier: f64, per_thread_multiplier: f64) -> Option<u32> {
    if !(per_thread_multiplier > 1.0) {
        return None;
    }
    if !(multiplier > 1.0) {
        return Some(0);
    }
    Some(ceil_threads(multiplier.ln() / per_thread_multiplier.ln()))
}

struct Draft<'a> {
    snapshot: &'a TargetSnapshot,
    /// Threads per slot, indexed like `Phase::ORDER`.
    slots: [u32; 4],
    degenerate: Vec<Degenerate>,
}

impl<'a> Draft<'a> {
    fn new(snapshot: &'a TargetSnapshot) -> Self {
        Self {
            snapshot,
            slots: [0; 4],
            degenerate: Vec::new(),
        }
    }

    fn set(&mut self, phase: Phase, threads: u32) {
        self.slots[slot_index(phase)] = threads;
    }

    fn flag(&mut self, flag: Degenerate) {
        if !self.degenerate.contains(&flag) {
            self.degenerate.push(flag);
        }
    }

    /// Threads that remove `defense` worth of defense.
    fn stabilize_for(&mut self, defense: f64) -> u32 {
        if defense <= 0.0 {
            return 0;
        }
        let effect = self.snapshot.weaken_effect_per_thread;
        if !(effect > 0.0) {
            self.flag(Degenerate::WeakenEffect);
            return 0;
        }
        ceil_threads(defense / effect)
    }

    /// Threads that raise value from `from_value` to the ceiling.
    fn grow_from(&mut self, from_value: f64) -> u32 {
        let multiplier = self.snapshot.max_value / from_value.max(1.0);
        match growth_threads(multiplier, self.snapshot.growth_multiplier_per_thread) {
            Some(threads) => threads,
            None => {
                self.flag(Degenerate::GrowthMultiplier);
                0
            }
        }
    }

    /// Threads that extract `fraction` of value.
    fn harvest_fraction(&mut self, fraction: f64) -> u32 {
        let per_thread = self.snapshot.harvest_yield_per_thread;
        if !(per_thread > 0.0) {
            self.flag(Degenerate::HarvestYield);
            return 0;
        }
        ceil_threads(fraction / per_thread)
    }

    fn threshold(&mut self, tunables: &Tunables) -> Decision {
        let snap = self.snapshot;

        if snap.defense_level > snap.min_defense + tunables.defense_slack {
            let threads = self.stabilize_for(snap.excess_defense());
            self.set(Phase::Stabilize1, threads);
            return Decision::Stabilize;
        }

        if snap.value < tunables.value_threshold_ratio * snap.max_value {
            let grow = self.grow_from(snap.value);
            let corrective =
                self.stabilize_for(f64::from(grow) * snap.growth_security_per_thread);
            self.set(Phase::Grow, grow);
            self.set(Phase::Stabilize2, corrective);
            return Decision::Grow;
        }

        let harvest = self.harvest_fraction(tunables.harvest_fraction);
        let corrective =
            self.stabilize_for(f64::from(harvest) * snap.harvest_security_per_thread);
        self.set(Phase::Harvest, harvest);
        self.set(Phase::Stabilize2, corrective);
        Decision::Harvest
    }

    fn batch(&mut self, tunables: &Tunables) -> Decision {
        let snap = self.snapshot;

        let pre = self.stabilize_for(snap.excess_defense());
        let harvest = self.harvest_fraction(tunables.harvest_fraction);
        let taken = if harvest > 0 {
            tunables.harvest_fraction
        } else {
            0.0
        };
        let grow = self.grow_from(snap.value * (1.0 - taken));
        let added = f64::from(grow) * snap.growth_security_per_thread
            + f64::from(harvest) * snap.harvest_security_per_thread;
        let post = self.stabilize_for(added);

        self.set(Phase::Stabilize1, pre);
        self.set(Phase::Grow, grow);
        self.set(Phase::Stabilize2, post);
        self.set(Phase::Harvest, harvest);
        Decision::Batch
    }

    fn drain(&mut self) -> Decision {
        let harvest = self.harvest_fraction(1.0);
        self.set(Phase::Harvest, harvest);
        Decision::Drain
    }

    fn finish(mut self, mode: PlanMode, decision: Decision) -> Plan {
        let snap = self.snapshot;
        let mut jobs = Vec::new();

        for phase in Phase::ORDER {
            let threads = self.slots[slot_index(phase)];
            if threads == 0 {
                continue;
            }
            let stage = phase.stage();
            let cost = snap.cost_for(stage);
            if !(cost.is_finite() && cost > 0.0) {
                self.flag(Degenerate::ThreadCost(stage));
                continue;
            }
            jobs.push(Job {
                phase,
                stage,
                target: snap.target.clone(),
                requested_threads: threads,
                per_thread_cost: cost,
                duration_ms: snap.duration_ms(stage),
            });
        }

        Plan {
            target: snap.target.clone(),
            mode,
            decision,
            jobs,
            degenerate: self.degenerate,
        }
    }
}

fn slot_index(phase: Phase) -> usize {
    match phase {
        Phase::Stabilize1 => 0,
        Phase::Grow => 1,
        Phase::Stabilize2 => 2,
        Phase::Harvest => 3,
    }
}
