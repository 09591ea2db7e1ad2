//! Target selection — ranks targets for the supervisor.
//!
//! Runs on a slow cadence, well off the per-cycle hot path.

use std::cmp::Ordering;

use tracing::debug;

use harvest_core::{RankedTarget, TargetSnapshot};

/// Bounds on how many targets the fleet works at once.
pub const MIN_TARGETS: u32 = 10;
pub const MAX_TARGETS: u32 = 99;

/// Operator skill at which the target count saturates.
const SATURATION_SKILL: u32 = 1_000;

/// Whether `snapshot` can be worked at all.
pub fn is_eligible(snapshot: &TargetSnapshot) -> bool {
    snapshot.accessible
        && snapshot.max_value > 0.0
        && snapshot.harvest_ms > 0.0
        && snapshot.required_skill <= snapshot.operator_skill
}

/// Value ceiling per millisecond of harvest time.
pub fn score(snapshot: &TargetSnapshot) -> f64 {
    if snapshot.harvest_ms > 0.0 {
        snapshot.max_value / snapshot.harvest_ms
    } else {
        0.0
    }
}

/// Score eligible targets and keep the best `limit`, best first.
pub fn rank_targets(snapshots: &[TargetSnapshot], limit: usize) -> Vec<RankedTarget> {
    let mut ranked: Vec<RankedTarget> = snapshots
        .iter()
        .filter(|s| is_eligible(s))
        .map(|s| RankedTarget {
            target: s.target.clone(),
            score: score(s),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.target.cmp(&b.target))
    });
    ranked.truncate(limit);

    debug!(
        candidates = snapshots.len(),
        selected = ranked.len(),
        "targets ranked"
    );
    ranked
}

/// Number of targets to work for a given operator skill.
///
/// Scales linearly from [`MIN_TARGETS`] at skill 0 to [`MAX_TARGETS`] at
/// skill 1000 and stays there.
pub fn dynamic_target_count(skill: u32) -> u32 {
    if skill >= SATURATION_SKILL {
        return MAX_TARGETS;
    }
    let scaled = f64::from((MAX_TARGETS - MIN_TARGETS) * skill) / f64::from(SATURATION_SKILL);
    (f64::from(MIN_TARGETS) + scaled).round() as u32
}
