//! harvestgrid-state — file-backed state shared between HarvestGrid
//! producers and the scheduler.
//!
//! # Architecture
//!
//! All records are JSON documents under one data directory. External
//! producers write them; the scheduler reads them once per use:
//!
//! ```text
//! data/
//!   ├── <target>-snapshot.json   (snapshot provider → plan calculator, every cycle)
//!   ├── fleet.json               (fleet inventory → allocator, every allocation)
//!   └── top_targets.json         (target selection → supervisor, slow cadence)
//! ```
//!
//! Writes go to a temp file and are renamed into place, so a reader never
//! observes a half-written record.

pub mod error;
pub mod files;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::{FleetInventory, SnapshotSource, StateStore};
