pub mod fleet;
pub mod plan;
pub mod rank;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::watch;
use tracing::{error, info, warn};

use harvest_core::{HarvestConfig, TargetSnapshot};
use harvestgrid_placement::CandidatePolicy;
use harvestgrid_scheduler::{Allocator, CapacityLedger, ProcessDispatcher, RetryPolicy};
use harvestgrid_state::StateStore;

/// Configuration and state shared by every subcommand.
pub struct Context {
    pub config: HarvestConfig,
    pub store: StateStore,
}

impl Context {
    pub fn load(config_path: &Path, data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = HarvestConfig::load_or_default(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        if let Some(dir) = data_dir {
            config.paths.data_dir = dir.to_path_buf();
        }

        let store = StateStore::open(&config.paths.data_dir)?;
        info!(
            config = %config_path.display(),
            data_dir = %config.paths.data_dir.display(),
            mode = config.planner.mode.label(),
            "configuration loaded"
        );
        Ok(Self { config, store })
    }

    /// Live allocator backed by the process dispatcher.
    pub fn allocator(&self, force: bool) -> anyhow::Result<Arc<Allocator>> {
        let paths = &self.config.paths;
        let dispatch = &self.config.dispatch;
        let dispatcher = ProcessDispatcher::new(
            &paths.payload_dir,
            &paths.nodes_dir,
            dispatch.launcher.clone(),
        )?;

        let allocator = Allocator::new(
            Arc::new(self.store.clone()),
            Arc::new(dispatcher),
            Arc::new(CapacityLedger::new()),
            CandidatePolicy::from_config(dispatch),
            dispatch.payloads.clone(),
        )
        .with_retry(RetryPolicy::from_config(&self.config.retry))
        .with_force(force);
        Ok(Arc::new(allocator))
    }

    /// The target's snapshot, or `None` (logged) when it cannot be read.
    pub fn startup_snapshot(&self, target: &str) -> Option<TargetSnapshot> {
        match self.store.get_snapshot(target) {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                error!(%target, data_dir = %self.store.root().display(), "no snapshot for target");
                None
            }
            Err(e) => {
                error!(%target, error = %e, "snapshot unreadable");
                None
            }
        }
    }
}

/// A receiver that flips to `true` on Ctrl-C.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl-C handler; running until killed");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

pub fn print_config(ctx: &Context) -> anyhow::Result<()> {
    print!("{}", ctx.config.to_toml_string()?);
    Ok(())
}
