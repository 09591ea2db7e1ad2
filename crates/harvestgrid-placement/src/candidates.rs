//! Candidate ordering — which nodes may take a job, in priority order.

use std::collections::HashSet;

use tracing::debug;

use harvest_core::config::DispatchConfig;
use harvest_core::{NodeId, TargetSnapshot, WorkerNode};

/// Fleet-wide rules that shape the candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePolicy {
    pub home_node: NodeId,
    pub excluded_prefixes: Vec<String>,
}

impl CandidatePolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            home_node: config.home_node.clone(),
            excluded_prefixes: config.excluded_prefixes.clone(),
        }
    }

    fn is_excluded(&self, node: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && node.starts_with(prefix.as_str()))
    }
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Order the inventory for `snapshot`: home first, then the target's
/// worker pool, then its auxiliary nodes.
///
/// The first occurrence of a node wins. Excluded nodes and nodes the
/// inventory does not know about are dropped.
pub fn candidate_order(
    snapshot: &TargetSnapshot,
    policy: &CandidatePolicy,
    inventory: &[WorkerNode],
) -> Vec<WorkerNode> {
    let wanted = std::iter::once(&policy.home_node)
        .chain(snapshot.worker_pool.iter())
        .chain(snapshot.auxiliary_nodes.iter());

    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();

    for id in wanted {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if policy.is_excluded(id) {
            debug!(node = %id, "skipping excluded node");
            continue;
        }
        match inventory.iter().find(|n| &n.id == id) {
            Some(node) => ordered.push(node.clone()),
            None => debug!(node = %id, "node missing from inventory"),
        }
    }

    ordered
}
