//! harvestgrid-placement — decides which nodes run a job's threads.
//!
//! Placement is split in two pure steps so that the same fleet state always
//! yields the same fragment plan:
//!
//! - **`candidates`** — orders the fleet (home, worker pool, auxiliaries)
//! - **`packer`** — greedily packs threads onto that order
//!
//! The live allocator in `harvestgrid-scheduler` repeats the packer's
//! arithmetic node by node, interleaved with payload placement and launch.

pub mod candidates;
pub mod packer;

pub use candidates::{CandidatePolicy, candidate_order};
pub use packer::{AllocationOutcome, AllocationReport, pack, threads_for_node};
