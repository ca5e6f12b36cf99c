use crate::output::{print_json, print_table, rev};
use crate::settings::open_store;
use schemagate_core::cancel::CancelToken;
use schemagate_core::config::Config;
use schemagate_core::reconcile::Reconciler;

/// Probe and decide, then print what `upgrade` would do. Writes nothing.
pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    let mut store = open_store(config, cancel.clone())?;
    let (state, plan) = Reconciler::new(config.reconcile_options(), cancel).plan(&mut store)?;

    if json {
        #[derive(serde::Serialize)]
        struct PlanOutput<'a> {
            state: &'a schemagate_core::state::SchemaState,
            plan: &'a schemagate_core::plan::Plan,
        }
        return print_json(&PlanOutput {
            state: &state,
            plan: &plan,
        });
    }

    println!(
        "tracking table: {}",
        if state.exists { "present" } else { "absent" }
    );
    println!("action:         {}", plan.action);
    println!("from:           {}", rev(plan.from.as_ref()));
    println!("to:             {}", rev(plan.to.as_ref()));
    if plan.steps.is_empty() {
        println!("no migration steps");
        return Ok(());
    }
    println!();
    let rows = plan
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            vec![
                (i + 1).to_string(),
                step.direction.to_string(),
                step.revision.id.to_string(),
                step.revision.description.clone(),
            ]
        })
        .collect();
    print_table(&["#", "DIRECTION", "REVISION", "DESCRIPTION"], rows);
    Ok(())
}
