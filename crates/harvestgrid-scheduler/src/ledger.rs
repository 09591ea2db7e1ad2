//! Capacity ledger — serializes allocation across controllers.
//!
//! Fleet inventory reports capacity as last observed by its producer, which
//! lags behind jobs this process just launched. Every allocation holds the
//! ledger lock from inventory read to last launch, and each launched
//! fragment leaves a reservation that is subtracted from observed free
//! capacity until the job's estimated completion.
//!
//! Two scheduler processes sharing a fleet do not see each other's
//! reservations.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use harvest_core::{NodeId, WorkerNode};

#[derive(Debug, Clone)]
struct Reservation {
    node: NodeId,
    capacity: f64,
    expires_at: Instant,
}

/// Process-wide record of in-flight capacity.
#[derive(Debug, Default)]
pub struct CapacityLedger {
    reservations: Mutex<Vec<Reservation>>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive access for one allocation.
    pub async fn lock(&self) -> LedgerGuard<'_> {
        let mut reservations = self.reservations.lock().await;
        let now = Instant::now();
        let before = reservations.len();
        reservations.retain(|r| r.expires_at > now);
        let expired = before - reservations.len();
        if expired > 0 {
            debug!(expired, "released expired reservations");
        }
        LedgerGuard { reservations }
    }

    /// Total capacity currently reserved on `node`.
    pub async fn reserved_on(&self, node: &str) -> f64 {
        self.lock().await.reserved_on(node)
    }
}

/// Exclusive view of the ledger, held for the duration of one allocation.
pub struct LedgerGuard<'a> {
    reservations: MutexGuard<'a, Vec<Reservation>>,
}

impl LedgerGuard<'_> {
    /// Charge outstanding reservations against observed usage.
    pub fn apply(&self, nodes: Vec<WorkerNode>) -> Vec<WorkerNode> {
        nodes
            .into_iter()
            .map(|mut node| {
                node.used_capacity += self.reserved_on(&node.id);
                node
            })
            .collect()
    }

    /// Hold `capacity` on `node` for `hold`.
    pub fn reserve(&mut self, node: &str, capacity: f64, hold: Duration) {
        if !(capacity > 0.0) {
            return;
        }
        self.reservations.push(Reservation {
            node: node.to_string(),
            capacity,
            expires_at: Instant::now() + hold,
        });
    }

    pub fn reserved_on(&self, node: &str) -> f64 {
        self.reservations
            .iter()
            .filter(|r| r.node == node)
            .map(|r| r.capacity)
            .sum()
    }
}
