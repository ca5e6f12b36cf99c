//! One reconciliation pass: lease → probe → decide → apply → release.

use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{display_rev, GateError, Result};
use crate::executor::{Executor, Outcome};
use crate::graph::RevisionGraph;
use crate::plan::{decide, FirstRun, Intent, Plan};
use crate::state::{probe, SchemaState};
use crate::store::{Lease, LeaseOutcome, MigrationStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub ttl: Duration,
    pub wait: Duration,
    pub poll: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            wait: Duration::from_secs(300),
            poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub intent: Intent,
    pub first_run: FirstRun,
    /// `None` disables the advisory lease.
    pub lock: Option<LockOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub state: SchemaState,
    pub plan: Plan,
    pub outcome: Outcome,
}

pub struct Reconciler {
    options: ReconcileOptions,
    cancel: CancelToken,
    holder: String,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions, cancel: CancelToken) -> Self {
        Self {
            options,
            cancel,
            holder: format!("pid{}-{}", std::process::id(), Uuid::new_v4()),
        }
    }

    /// Probe and decide without writing anything.
    pub fn plan<S: MigrationStore + ?Sized>(&self, store: &mut S) -> Result<(SchemaState, Plan)> {
        let state = probe(store)?;
        let graph = store.list_graph()?;
        let plan = decide(&state, &graph, self.options.intent, self.options.first_run)?;
        Ok((state, plan))
    }

    /// Reconcile the store to the graph head.
    pub fn run<S: MigrationStore + ?Sized>(&self, store: &mut S) -> Result<Report> {
        let (intent, first_run) = (self.options.intent, self.options.first_run);
        let report = self.run_with(store, |state, graph| decide(state, graph, intent, first_run))?;
        if report.outcome.revision.is_none() {
            return Err(GateError::Store(
                "reconciliation finished without a tracked revision".into(),
            ));
        }
        Ok(report)
    }

    /// Run an arbitrary plan under the lease. The plan is computed from a
    /// probe taken after the lease is held.
    pub fn run_with<S, F>(&self, store: &mut S, make_plan: F) -> Result<Report>
    where
        S: MigrationStore + ?Sized,
        F: FnOnce(&SchemaState, &RevisionGraph) -> Result<Plan>,
    {
        let lease = match &self.options.lock {
            Some(lock) => Some(self.acquire(store, lock)?),
            None => None,
        };

        let result = self.reconcile_locked(store, lease.clone(), make_plan);

        if lease.is_some() {
            if let Err(e) = store.release_lease(&self.holder) {
                tracing::warn!(error = %e, "failed to release reconciliation lease; it will expire");
            }
        }
        result
    }

    fn reconcile_locked<S, F>(&self, store: &mut S, lease: Option<Lease>, make_plan: F) -> Result<Report>
    where
        S: MigrationStore + ?Sized,
        F: FnOnce(&SchemaState, &RevisionGraph) -> Result<Plan>,
    {
        let state = probe(store)?;
        let graph = store.list_graph()?;
        let plan = make_plan(&state, &graph)?;
        tracing::info!(
            action = %plan.action,
            from = %display_rev(plan.from.as_ref()),
            to = %display_rev(plan.to.as_ref()),
            steps = plan.steps.len(),
            "reconciliation plan"
        );

        let mut executor = Executor::new(self.cancel.clone());
        if let Some(lease) = lease {
            executor = executor.with_lease(lease);
        }
        let outcome = executor.apply(store, &plan)?;

        if outcome.revision != plan.to {
            return Err(GateError::ConcurrentReconciliation {
                expected: display_rev(plan.to.as_ref()),
                found: display_rev(outcome.revision.as_ref()),
            });
        }
        Ok(Report {
            state,
            plan,
            outcome,
        })
    }

    fn acquire<S: MigrationStore + ?Sized>(&self, store: &mut S, lock: &LockOptions) -> Result<Lease> {
        let lease = Lease {
            holder: self.holder.clone(),
            ttl: lock.ttl,
        };
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(GateError::Cancelled);
            }
            let (holder, expires_at) = match store.acquire_lease(&lease)? {
                LeaseOutcome::Acquired => {
                    tracing::debug!(holder = %lease.holder, "reconciliation lease acquired");
                    return Ok(lease);
                }
                LeaseOutcome::Held { holder, expires_at } => {
                    tracing::info!(%holder, %expires_at, "waiting for reconciliation lease");
                    (holder, expires_at.to_rfc3339())
                }
                LeaseOutcome::Busy => {
                    tracing::info!("store busy with another writer; waiting for reconciliation lease");
                    ("another writer".to_string(), "unknown".to_string())
                }
            };
            if started.elapsed() >= lock.wait {
                return Err(GateError::LockTimeout {
                    holder,
                    expires_at,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            std::thread::sleep(lock.poll);
        }
    }
}
