//! In-process store. Clones share one backing cell, so two clones behave
//! like two replicas talking to the same database.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::{GateError, Result};
use crate::graph::RevisionGraph;
use crate::revision::{Direction, Revision, RevisionId};

use super::{Lease, LeaseOutcome, MigrationStore, StepOutcome};

#[derive(Debug, Default)]
struct Shared {
    /// `None` = no tracking table; `Some(None)` = table present but empty.
    tracking: Option<Option<RevisionId>>,
    journal: Vec<(RevisionId, Direction)>,
    failures: Vec<(RevisionId, Direction)>,
    unreachable: bool,
    lease: Option<(String, chrono::DateTime<Utc>)>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    graph: RevisionGraph,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new(graph: RevisionGraph) -> Self {
        Self {
            graph,
            shared: Arc::default(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>> {
        let shared = self
            .shared
            .lock()
            .map_err(|_| GateError::Store("memory store lock poisoned".into()))?;
        if shared.unreachable {
            return Err(GateError::StoreUnreachable("memory store offline".into()));
        }
        Ok(shared)
    }

    fn lock_raw(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the tracking table holding `revision` (out-of-band provisioning).
    pub fn seed_tracking(&self, revision: Option<RevisionId>) {
        self.lock_raw().tracking = Some(revision);
    }

    /// `None` when the tracking table does not exist.
    pub fn tracking(&self) -> Option<Option<RevisionId>> {
        self.lock_raw().tracking.clone()
    }

    /// Every step that committed, in order.
    pub fn journal(&self) -> Vec<(RevisionId, Direction)> {
        self.lock_raw().journal.clone()
    }

    /// Make the given step fail (and roll back) whenever it runs.
    pub fn fail_step(&self, revision: RevisionId, direction: Direction) {
        self.lock_raw().failures.push((revision, direction));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock_raw().unreachable = unreachable;
    }

    fn step(&self, revision: &Revision, direction: Direction) -> Result<StepOutcome> {
        let mut shared = self.lock()?;
        let current = shared.tracking.clone().flatten();
        if current.as_ref() != revision.expected_before(direction) {
            return Ok(StepOutcome::Superseded { found: current });
        }
        if shared
            .failures
            .iter()
            .any(|(id, dir)| id == &revision.id && *dir == direction)
        {
            return Err(GateError::Execution {
                revision: revision.id.to_string(),
                direction: direction.to_string(),
                reason: "injected failure".into(),
            });
        }
        shared.tracking = Some(revision.resulting(direction).cloned());
        shared.journal.push((revision.id.clone(), direction));
        Ok(StepOutcome::Applied)
    }
}

impl MigrationStore for MemoryStore {
    fn probe_tracking_table(&mut self) -> Result<bool> {
        Ok(self.lock()?.tracking.is_some())
    }

    fn read_revision(&mut self) -> Result<Option<RevisionId>> {
        Ok(self.lock()?.tracking.clone().flatten())
    }

    fn write_revision(&mut self, expected: Option<&RevisionId>, next: &RevisionId) -> Result<bool> {
        let mut shared = self.lock()?;
        if shared.tracking.clone().flatten().as_ref() != expected {
            return Ok(false);
        }
        shared.tracking = Some(Some(next.clone()));
        Ok(true)
    }

    fn apply_step_forward(&mut self, revision: &Revision) -> Result<StepOutcome> {
        self.step(revision, Direction::Forward)
    }

    fn apply_step_backward(&mut self, revision: &Revision) -> Result<StepOutcome> {
        self.step(revision, Direction::Backward)
    }

    fn list_graph(&self) -> Result<RevisionGraph> {
        Ok(self.graph.clone())
    }

    fn acquire_lease(&mut self, lease: &Lease) -> Result<LeaseOutcome> {
        let mut shared = self.lock()?;
        let now = Utc::now();
        if let Some((holder, expires_at)) = &shared.lease {
            if holder != &lease.holder && *expires_at > now {
                return Ok(LeaseOutcome::Held {
                    holder: holder.clone(),
                    expires_at: *expires_at,
                });
            }
        }
        let ttl = chrono::Duration::from_std(lease.ttl)
            .map_err(|e| GateError::InvalidConfig(format!("lease ttl: {e}")))?;
        shared.lease = Some((lease.holder.clone(), now + ttl));
        Ok(LeaseOutcome::Acquired)
    }

    fn release_lease(&mut self, holder: &str) -> Result<()> {
        let mut shared = self.lock()?;
        if shared.lease.as_ref().is_some_and(|(h, _)| h == holder) {
            shared.lease = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn lease(holder: &str) -> Lease {
        Lease {
            holder: holder.into(),
            ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn clones_share_tracking_cell() {
        let a = MemoryStore::new(RevisionGraph::default());
        let mut b = a.clone();
        a.seed_tracking(Some(id("v1")));
        assert_eq!(b.read_revision().unwrap(), Some(id("v1")));
    }

    #[test]
    fn guarded_step_reports_superseded() {
        let mut store = MemoryStore::new(RevisionGraph::default());
        store.seed_tracking(Some(id("v2")));
        let v2 = Revision::new(id("v2"), Some(id("v1")));
        let outcome = store.apply_step_forward(&v2).unwrap();
        assert_eq!(outcome, StepOutcome::Superseded { found: Some(id("v2")) });
        assert!(store.journal().is_empty());
    }

    #[test]
    fn lease_is_exclusive_until_released() {
        let mut a = MemoryStore::new(RevisionGraph::default());
        let mut b = a.clone();
        assert_eq!(a.acquire_lease(&lease("a")).unwrap(), LeaseOutcome::Acquired);
        assert!(matches!(b.acquire_lease(&lease("b")).unwrap(), LeaseOutcome::Held { holder, .. } if holder == "a"));
        a.release_lease("a").unwrap();
        assert_eq!(b.acquire_lease(&lease("b")).unwrap(), LeaseOutcome::Acquired);
    }
}
