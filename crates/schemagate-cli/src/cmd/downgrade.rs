use crate::cmd::{print_report, reconcile_with};
use crate::output::print_json;
use anyhow::Context;
use schemagate_core::config::Config;
use schemagate_core::plan::downgrade_to;
use schemagate_core::revision::RevisionId;

/// `base` removes every applied revision.
pub fn run(config: &Config, target: &str, json: bool) -> anyhow::Result<()> {
    let target = match target {
        "base" => None,
        other => Some(RevisionId::new(other).context("invalid downgrade target")?),
    };
    let report = reconcile_with(config, |state, graph| {
        downgrade_to(state, graph, target.as_ref())
    })?;
    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}
