pub mod downgrade;
pub mod history;
pub mod plan;
pub mod run;
pub mod status;
pub mod upgrade;

use crate::output::rev;
use crate::settings::open_store;
use crate::signals::SignalWatch;
use schemagate_core::cancel::CancelToken;
use schemagate_core::config::Config;
use schemagate_core::graph::RevisionGraph;
use schemagate_core::plan::Plan;
use schemagate_core::reconcile::{Reconciler, Report};
use schemagate_core::state::SchemaState;
use schemagate_core::GateError;

/// Reconcile to the graph head with SIGTERM/SIGINT wired to cancellation.
pub fn reconcile(config: &Config) -> anyhow::Result<Report> {
    with_signals(|cancel| reconcile_once(config, cancel))
}

/// Reconcile to the graph head; the caller owns signal handling.
pub fn reconcile_once(config: &Config, cancel: CancelToken) -> anyhow::Result<Report> {
    let mut store = open_store(config, cancel.clone())?;
    let report = Reconciler::new(config.reconcile_options(), cancel).run(&mut store)?;
    Ok(report)
}

/// Same as [`reconcile`], but with an operator-chosen plan.
pub fn reconcile_with<F>(config: &Config, make_plan: F) -> anyhow::Result<Report>
where
    F: FnOnce(&SchemaState, &RevisionGraph) -> schemagate_core::Result<Plan>,
{
    with_signals(|cancel| {
        let mut store = open_store(config, cancel.clone())?;
        let report = Reconciler::new(config.reconcile_options(), cancel)
            .run_with(&mut store, make_plan)?;
        Ok(report)
    })
}

fn with_signals<T>(f: impl FnOnce(CancelToken) -> anyhow::Result<T>) -> anyhow::Result<T> {
    let cancel = CancelToken::new();
    let signals = SignalWatch::start(cancel.clone())?;
    let result = f(cancel.clone());
    signals.stop();

    let value = result?;
    if cancel.is_cancelled() {
        return Err(GateError::Cancelled.into());
    }
    Ok(value)
}

pub fn print_report(report: &Report) {
    let plan = &report.plan;
    let outcome = &report.outcome;
    println!(
        "{}: {} -> {}",
        plan.action,
        rev(plan.from.as_ref()),
        rev(outcome.revision.as_ref())
    );
    for step in &outcome.applied {
        println!("  {:<9} {}", step.direction, step.revision);
    }
    if outcome.skipped > 0 {
        println!("  {} step(s) already applied by another replica", outcome.skipped);
    }
    if plan.is_noop() {
        println!("  nothing to do");
    }
}
