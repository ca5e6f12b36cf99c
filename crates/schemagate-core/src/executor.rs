//! Applies a [`Plan`] against a [`MigrationStore`].
//!
//! Steps commit one at a time. A failure stops the run where it is: the
//! tracked revision reflects the last committed step and nothing is rolled
//! further back. Stamps are a single conditional write against the revision
//! the plan was computed from.

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::{display_rev, GateError, Result};
use crate::plan::Plan;
use crate::revision::{Direction, RevisionId};
use crate::store::{Lease, LeaseOutcome, MigrationStore, StepOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub revision: RevisionId,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Tracked revision after the run.
    pub revision: Option<RevisionId>,
    /// Steps this run committed, in order.
    pub applied: Vec<AppliedStep>,
    /// Forward steps found already committed by another reconciler.
    pub skipped: usize,
    pub stamped: bool,
}

pub struct Executor {
    cancel: CancelToken,
    lease: Option<Lease>,
}

impl Executor {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel, lease: None }
    }

    /// Renew `lease` after every committed step.
    pub fn with_lease(mut self, lease: Lease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn apply<S: MigrationStore + ?Sized>(&self, store: &mut S, plan: &Plan) -> Result<Outcome> {
        if self.cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }
        if plan.action.is_stamp() {
            return self.stamp(store, plan);
        }
        if plan.steps.is_empty() {
            let current = store.read_revision()?;
            if current != plan.from {
                return Err(concurrent(plan.from.as_ref(), current.as_ref()));
            }
            tracing::info!(revision = %display_rev(current.as_ref()), "schema already current");
            return Ok(Outcome {
                revision: current,
                applied: Vec::new(),
                skipped: 0,
                stamped: false,
            });
        }

        let total = plan.steps.len();
        let mut current = plan.from.clone();
        let mut applied = Vec::new();
        let mut skipped = 0;
        let mut i = 0;
        while i < total {
            if self.cancel.is_cancelled() {
                tracing::warn!(completed = applied.len(), total, "cancelled between steps");
                return Err(GateError::Cancelled);
            }
            let step = &plan.steps[i];
            let rev = &step.revision;
            tracing::info!(
                revision = %rev.id,
                direction = %step.direction,
                step = i + 1,
                total,
                "applying step"
            );
            let result = match step.direction {
                Direction::Forward => store.apply_step_forward(rev),
                Direction::Backward => store.apply_step_backward(rev),
            };
            let outcome = result.inspect_err(|e| {
                tracing::error!(
                    revision = %rev.id,
                    direction = %step.direction,
                    left_at = %display_rev(current.as_ref()),
                    error = %e,
                    "step failed; store left at last committed step"
                );
            })?;

            match outcome {
                StepOutcome::Applied => {
                    current = rev.resulting(step.direction).cloned();
                    applied.push(AppliedStep {
                        revision: rev.id.clone(),
                        direction: step.direction,
                    });
                    self.renew(store)?;
                    i += 1;
                }
                StepOutcome::Superseded { found } => {
                    let resume = match step.direction {
                        Direction::Forward => catch_up(plan, i, found.as_ref()),
                        Direction::Backward => None,
                    };
                    let Some(next) = resume else {
                        return Err(concurrent(
                            rev.expected_before(step.direction),
                            found.as_ref(),
                        ));
                    };
                    tracing::warn!(
                        found = %display_rev(found.as_ref()),
                        skipped = next - i,
                        "steps already applied by a concurrent reconciler"
                    );
                    skipped += next - i;
                    current = found;
                    i = next;
                }
            }
        }

        Ok(Outcome {
            revision: current,
            applied,
            skipped,
            stamped: false,
        })
    }

    fn stamp<S: MigrationStore + ?Sized>(&self, store: &mut S, plan: &Plan) -> Result<Outcome> {
        let Some(target) = plan.to.as_ref() else {
            return Err(GateError::InvalidConfig("stamp plan has no target".into()));
        };
        if !store.write_revision(plan.from.as_ref(), target)? {
            let found = store.read_revision()?;
            return Err(concurrent(plan.from.as_ref(), found.as_ref()));
        }
        tracing::info!(revision = %target, action = %plan.action, "stamped without running steps");
        Ok(Outcome {
            revision: Some(target.clone()),
            applied: Vec::new(),
            skipped: 0,
            stamped: true,
        })
    }

    fn renew<S: MigrationStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let Some(lease) = &self.lease else {
            return Ok(());
        };
        match store.acquire_lease(lease)? {
            LeaseOutcome::Acquired => Ok(()),
            // Still ours until expiry; the next step renews again.
            LeaseOutcome::Busy => Ok(()),
            LeaseOutcome::Held { holder, .. } => Err(GateError::LeaseLost { holder }),
        }
    }
}

/// Index to resume at when the store already holds `found`, a forward step
/// at or after position `i` of the same plan.
fn catch_up(plan: &Plan, i: usize, found: Option<&RevisionId>) -> Option<usize> {
    let found = found?;
    plan.steps[i..]
        .iter()
        .position(|s| s.direction == Direction::Forward && &s.revision.id == found)
        .map(|offset| i + offset + 1)
}

fn concurrent(expected: Option<&RevisionId>, found: Option<&RevisionId>) -> GateError {
    GateError::ConcurrentReconciliation {
        expected: display_rev(expected),
        found: display_rev(found),
    }
}
