use std::sync::Arc;

use tracing::{error, info, warn};

use harvest_core::PlanMode;
use harvestgrid_scheduler::{ControllerSettings, CycleController, CycleSummary};

use super::{Context, shutdown_signal};

/// Run cycles against `target` until Ctrl-C.
pub async fn run(
    ctx: &Context,
    target: &str,
    force: bool,
    mode: Option<PlanMode>,
) -> anyhow::Result<()> {
    if ctx.startup_snapshot(target).is_none() {
        return Ok(());
    }

    let mode = mode.unwrap_or(ctx.config.planner.mode);
    let controller = build(ctx, target, force, mode)?;
    let stats = controller.stats();

    controller.run(shutdown_signal()).await;

    let s = stats.snapshot();
    info!(
        %target,
        cycles = s.cycles,
        idle_cycles = s.idle_cycles,
        failed_cycles = s.failed_cycles,
        threads_started = s.threads_started,
        partial_stages = s.partial_stages,
        exhausted_stages = s.exhausted_stages,
        overruns = s.overruns,
        "run finished"
    );
    Ok(())
}

/// One cycle that harvests everything the target holds.
pub async fn drain(ctx: &Context, target: &str, force: bool) -> anyhow::Result<()> {
    if ctx.startup_snapshot(target).is_none() {
        return Ok(());
    }

    let controller = build(ctx, target, force, PlanMode::Drain)?;
    match controller.run_once().await {
        Ok(CycleSummary::Completed {
            started_threads,
            exhausted_stages,
            ..
        }) => {
            if exhausted_stages > 0 {
                warn!(%target, "drain found no capacity");
            }
            println!("{target}: {started_threads} harvest threads started");
        }
        Ok(CycleSummary::Idle) => {
            println!("{target}: nothing to harvest");
        }
        Err(e) => error!(%target, error = %e, "drain failed"),
    }
    Ok(())
}

fn build(
    ctx: &Context,
    target: &str,
    force: bool,
    mode: PlanMode,
) -> anyhow::Result<CycleController> {
    let settings = ControllerSettings::from_config(&ctx.config, mode);
    Ok(CycleController::new(
        target,
        Arc::new(ctx.store.clone()),
        ctx.allocator(force)?,
        settings,
    ))
}
