//! harvestgrid-scheduler — runs the extraction cycle against the fleet.
//!
//! # Architecture
//!
//! ```text
//!                    ┌────────────┐  ranks snapshots, one controller per target
//!                    │ Supervisor │
//!                    └─────┬──────┘
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!     CycleController CycleController CycleController   (one tokio task each)
//!            │             │             │
//!            └──────┬──────┴──────┬──────┘
//!                   ▼             ▼
//!               Allocator ──► CapacityLedger   (shared, serialized)
//!                   │
//!                   ▼
//!               Dispatcher ──► place payload, launch job
//! ```
//!
//! # Components
//!
//! - **`controller`** — per-target cycle loop and stats
//! - **`schedule`** — pure per-cycle step list and completion window
//! - **`allocator`** — live packing with dispatch and bounded retry
//! - **`ledger`** — in-process capacity reservations
//! - **`dispatch`** — the dispatcher seam and the process-backed dispatcher
//! - **`supervisor`** — fleet mode over the ranked targets

pub mod allocator;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod retry;
pub mod schedule;
pub mod supervisor;

pub use allocator::{Allocator, StageDispatch, StageOutcome};
pub use controller::{
    CompletionPolicy, ControllerSettings, ControllerStats, CycleController, CycleSummary,
    StatsSnapshot,
};
pub use dispatch::{BoxFuture, Dispatcher, ProcessDispatcher, ProcessHandle};
pub use error::{DispatchError, DispatchResult, SchedulerError, SchedulerResult};
pub use ledger::CapacityLedger;
pub use retry::RetryPolicy;
pub use schedule::{CycleStep, StageLaunch, build_schedule, completion_window};
pub use supervisor::{Supervisor, refresh_ranking};
