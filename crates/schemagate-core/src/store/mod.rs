//! The migration store boundary: everything the reconciler needs from the
//! backing database, and nothing else.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::graph::RevisionGraph;
use crate::revision::{Revision, RevisionId};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of one guarded step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran and the tracking cell moved in the same transaction.
    Applied,
    /// The tracking cell did not hold the expected revision; nothing ran.
    Superseded { found: Option<RevisionId> },
}

/// Advisory lease request.
#[derive(Debug, Clone)]
pub struct Lease {
    pub holder: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    Held {
        holder: String,
        expires_at: DateTime<Utc>,
    },
    /// Another connection holds the store's write lock (for example a
    /// replica mid-step). Retry later.
    Busy,
}

pub trait MigrationStore {
    /// Metadata lookup: does the tracking table exist (even if empty)?
    fn probe_tracking_table(&mut self) -> Result<bool>;

    /// The tracked revision; `None` when the table is absent or empty.
    fn read_revision(&mut self) -> Result<Option<RevisionId>>;

    /// Set the tracked revision without running steps, only if it still
    /// equals `expected`. Returns `false` (and writes nothing) otherwise.
    fn write_revision(&mut self, expected: Option<&RevisionId>, next: &RevisionId) -> Result<bool>;

    /// Run `revision`'s upgrade in one transaction, guarded on the tracked
    /// revision being its parent.
    fn apply_step_forward(&mut self, revision: &Revision) -> Result<StepOutcome>;

    /// Run `revision`'s downgrade in one transaction, guarded on the tracked
    /// revision being `revision` itself.
    fn apply_step_backward(&mut self, revision: &Revision) -> Result<StepOutcome>;

    fn list_graph(&self) -> Result<RevisionGraph>;

    /// Take or renew the reconciliation lease. Stores without locking
    /// support grant every request.
    fn acquire_lease(&mut self, _lease: &Lease) -> Result<LeaseOutcome> {
        Ok(LeaseOutcome::Acquired)
    }

    fn release_lease(&mut self, _holder: &str) -> Result<()> {
        Ok(())
    }
}
