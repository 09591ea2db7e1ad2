use std::time::Duration;

use tracing::info;

use harvestgrid_scheduler::{ControllerSettings, Supervisor};

use super::{Context, shutdown_signal};

/// Work the top-ranked targets concurrently until Ctrl-C.
pub async fn fleet(ctx: &Context, targets: Option<u32>, force: bool) -> anyhow::Result<()> {
    let count = target_count(targets, ctx.config.selection.top_k);
    let settings = ControllerSettings::from_config(&ctx.config, ctx.config.planner.mode);
    let refresh = Duration::from_secs(ctx.config.selection.refresh_secs.max(1));

    info!(
        targets = ?count,
        mode = ctx.config.planner.mode.label(),
        "starting fleet mode"
    );

    let supervisor = Supervisor::new(
        ctx.store.clone(),
        ctx.allocator(force)?,
        settings,
        count,
        refresh,
    );
    supervisor.run(shutdown_signal()).await;
    Ok(())
}

/// The flag wins over the config; zero from either means "derive it".
pub fn target_count(flag: Option<u32>, configured: Option<u32>) -> Option<u32> {
    flag.or(configured).filter(|&n| n > 0)
}
