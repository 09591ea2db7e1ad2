//! Supervisor — runs one cycle controller per top-ranked target.
//!
//! Every controller shares the same allocator, and therefore the same
//! capacity ledger and dispatcher. The ranking is refreshed on a slow
//! cadence; newly ranked targets get a controller, running controllers are
//! left alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{Id, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use harvest_core::{RankedTarget, TargetId};
use harvestgrid_planner::selection::MAX_TARGETS;
use harvestgrid_planner::{dynamic_target_count, rank_targets};
use harvestgrid_state::{SnapshotSource, StateStore};

use crate::allocator::Allocator;
use crate::controller::{ControllerSettings, ControllerStats, CycleController};
use crate::error::SchedulerResult;

pub struct Supervisor {
    store: StateStore,
    allocator: Arc<Allocator>,
    settings: ControllerSettings,
    /// Fixed target count; derived from operator skill when `None`.
    target_count: Option<u32>,
    refresh: Duration,
}

impl Supervisor {
    pub fn new(
        store: StateStore,
        allocator: Arc<Allocator>,
        settings: ControllerSettings,
        target_count: Option<u32>,
        refresh: Duration,
    ) -> Self {
        Self {
            store,
            allocator,
            settings,
            target_count,
            refresh,
        }
    }

    pub fn refresh_ranking(&self) -> SchedulerResult<Vec<RankedTarget>> {
        refresh_ranking(&self.store, self.target_count)
    }

    /// Run until `shutdown` fires, then wait for every controller to stop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut running: HashMap<TargetId, Arc<ControllerStats>> = HashMap::new();
        let mut task_targets: HashMap<Id, TargetId> = HashMap::new();

        info!(refresh_secs = self.refresh.as_secs(), "supervisor started");

        // Controllers only start on a refresh tick, so one that finishes
        // (a drain, say) stays stopped until the next scheduled refresh.
        let mut refresh = tokio::time::interval(self.refresh.max(Duration::from_millis(1)));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    self.spawn_ranked(&mut tasks, &mut running, &mut task_targets, &shutdown);
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    let (id, failure) = match joined {
                        Ok((id, ())) => (id, None),
                        Err(e) => (e.id(), Some(e)),
                    };
                    if let Some(target) = task_targets.remove(&id) {
                        let cycles = running.remove(&target).map_or(0, |s| s.cycles());
                        match failure {
                            None => info!(%target, cycles, "controller finished"),
                            Some(e) => warn!(%target, error = %e, "controller task failed"),
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        while tasks.join_next().await.is_some() {}

        for (target, stats) in &running {
            let s = stats.snapshot();
            info!(
                %target,
                cycles = s.cycles,
                threads_started = s.threads_started,
                exhausted_stages = s.exhausted_stages,
                "controller summary"
            );
        }
        info!(controllers = running.len(), "supervisor stopped");
    }

    fn spawn_ranked(
        &self,
        tasks: &mut JoinSet<()>,
        running: &mut HashMap<TargetId, Arc<ControllerStats>>,
        task_targets: &mut HashMap<Id, TargetId>,
        shutdown: &watch::Receiver<bool>,
    ) {
        if let Err(e) = self.refresh_ranking() {
            warn!(error = %e, "ranking refresh failed; keeping previous ranking");
        }
        let ranking = match self.store.get_ranking() {
            Ok(ranking) => ranking,
            Err(e) => {
                warn!(error = %e, "ranked-target file unreadable");
                return;
            }
        };
        if ranking.is_empty() {
            warn!("no eligible targets");
            return;
        }

        for entry in ranking {
            if running.contains_key(&entry.target) {
                continue;
            }
            let snapshots: Arc<dyn SnapshotSource> = Arc::new(self.store.clone());
            let controller = CycleController::new(
                &entry.target,
                snapshots,
                Arc::clone(&self.allocator),
                self.settings.clone(),
            );
            running.insert(entry.target.clone(), controller.stats());

            let rx = shutdown.clone();
            let handle = tasks.spawn(async move { controller.run(rx).await });
            task_targets.insert(handle.id(), entry.target.clone());
            info!(target = %entry.target, score = entry.score, "controller spawned");
        }
    }
}

/// Rank every stored snapshot and persist the top targets.
///
/// With no explicit count, the count follows the operator's skill.
pub fn refresh_ranking(
    store: &StateStore,
    target_count: Option<u32>,
) -> SchedulerResult<Vec<RankedTarget>> {
    let snapshots = store.list_snapshots()?;
    let count = match target_count {
        Some(n) => n.min(MAX_TARGETS),
        None => {
            let skill = snapshots.iter().map(|s| s.operator_skill).max().unwrap_or(0);
            dynamic_target_count(skill)
        }
    };

    let ranked = rank_targets(&snapshots, count as usize);
    store.put_ranking(&ranked)?;
    info!(
        snapshots = snapshots.len(),
        limit = count,
        ranked = ranked.len(),
        "ranking refreshed"
    );
    Ok(ranked)
}
