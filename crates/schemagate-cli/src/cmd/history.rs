use crate::output::{print_json, print_table, rev};
use anyhow::Context;
use schemagate_core::config::Config;
use schemagate_core::graph::RevisionGraph;
use schemagate_core::migrations;

fn load(config: &Config) -> anyhow::Result<RevisionGraph> {
    migrations::load_dir(&config.migrations).with_context(|| {
        format!("failed to load migrations from {}", config.migrations.display())
    })
}

// ---------------------------------------------------------------------------
// heads
// ---------------------------------------------------------------------------

/// Lists every head; more than one means the graph needs a merge revision.
pub fn heads(config: &Config, json: bool) -> anyhow::Result<()> {
    let graph = load(config)?;
    let heads = graph.heads();
    if json {
        return print_json(&heads);
    }
    if heads.is_empty() {
        println!("no revisions");
    }
    for head in &heads {
        println!("{head} (head)");
    }
    if heads.len() > 1 {
        eprintln!("warning: {} heads; reconciliation will refuse to run", heads.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

pub fn history(config: &Config, json: bool) -> anyhow::Result<()> {
    let graph = load(config)?;
    let revisions = graph.history();
    if json {
        return print_json(&revisions);
    }
    let rows = revisions
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                rev(r.parent.as_ref()),
                if graph.is_head(&r.id) { "head" } else { "" }.to_string(),
                r.description.clone(),
            ]
        })
        .collect();
    print_table(&["REVISION", "PARENT", "", "DESCRIPTION"], rows);
    Ok(())
}
