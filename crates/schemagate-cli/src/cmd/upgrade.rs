use crate::cmd::{print_report, reconcile};
use crate::output::print_json;
use schemagate_core::config::Config;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let report = reconcile(config)?;
    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}
