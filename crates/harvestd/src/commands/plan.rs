use serde::Serialize;

use harvest_core::config::Tunables;
use harvest_core::{PlanMode, WorkerNode};
use harvestgrid_placement::{AllocationReport, CandidatePolicy, candidate_order, pack};
use harvestgrid_planner::{Plan, compute_plan};

use super::Context;

#[derive(Serialize)]
struct Preview<'a> {
    plan: &'a Plan,
    allocation: Vec<AllocationReport>,
}

/// Print the next plan and how it would pack onto the current fleet.
pub fn plan(ctx: &Context, target: &str, mode: Option<PlanMode>) -> anyhow::Result<()> {
    let Some(snapshot) = ctx.startup_snapshot(target) else {
        return Ok(());
    };

    let tunables = Tunables {
        mode: mode.unwrap_or(ctx.config.planner.mode),
        ..ctx.config.planner.clone()
    };
    let plan = compute_plan(&snapshot, &tunables);

    let policy = CandidatePolicy::from_config(&ctx.config.dispatch);
    let candidates = candidate_order(&snapshot, &policy, &ctx.store.get_fleet()?);
    let allocation = preview(&plan, candidates);

    let out = Preview {
        plan: &plan,
        allocation,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Pack each job in order, charging earlier jobs against later ones.
fn preview(plan: &Plan, mut candidates: Vec<WorkerNode>) -> Vec<AllocationReport> {
    plan.jobs
        .iter()
        .map(|job| {
            let report = pack(job, &candidates);
            for fragment in &report.fragments {
                if let Some(node) = candidates.iter_mut().find(|n| n.id == fragment.node) {
                    node.used_capacity += fragment.capacity();
                }
            }
            report
        })
        .collect()
}
