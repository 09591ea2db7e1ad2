//! harvestgrid-planner — decides how many threads each stage of a cycle
//! needs, how the stages are paced, and which targets are worth working.
//!
//! Everything here is pure: the same snapshot and tunables always yield
//! the same plan.
//!
//! ```text
//! TargetSnapshot ──► compute_plan ──► Plan { Stabilize1, Grow, Stabilize2, Harvest }
//!                                        │
//! PlanMode ───────► Strategy::for_mode ──┴──► CycleController (harvestgrid-scheduler)
//!
//! [TargetSnapshot] ──► rank_targets ──► [RankedTarget] ──► Supervisor
//! ```

pub mod plan;
pub mod selection;
pub mod strategy;

pub use plan::{Decision, Degenerate, Plan, ceil_threads, compute_plan, growth_threads};
pub use selection::{dynamic_target_count, is_eligible, rank_targets, score};
pub use strategy::{Pacing, Strategy};
