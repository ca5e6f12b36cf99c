use crate::output::{print_json, rev};
use crate::settings::open_store;
use schemagate_core::cancel::CancelToken;
use schemagate_core::config::Config;
use schemagate_core::revision::RevisionId;
use schemagate_core::state::probe;
use schemagate_core::store::MigrationStore;

#[derive(serde::Serialize)]
struct StatusOutput {
    tracking_table: bool,
    current: Option<RevisionId>,
    heads: Vec<RevisionId>,
    /// Forward steps between `current` and the single head, when both are known.
    pending: Option<usize>,
    /// `current` is set but not in the migrations directory.
    orphan: bool,
}

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut store = open_store(config, CancelToken::new())?;
    let state = probe(&mut store)?;
    let graph = store.list_graph()?;

    let heads: Vec<RevisionId> = graph.heads().into_iter().cloned().collect();
    let orphan = state
        .revision
        .as_ref()
        .is_some_and(|current| !graph.contains(current));
    let pending = match (graph.head(), orphan) {
        (Ok(head), false) => graph
            .upgrade_path(state.revision.as_ref(), head)
            .ok()
            .map(|path| path.len()),
        _ => None,
    };

    let out = StatusOutput {
        tracking_table: state.exists,
        current: state.revision,
        heads,
        pending,
        orphan,
    };

    if json {
        return print_json(&out);
    }

    println!(
        "tracking table: {}",
        if out.tracking_table { "present" } else { "absent" }
    );
    println!("current:        {}", rev(out.current.as_ref()));
    let heads: Vec<String> = out.heads.iter().map(|h| h.to_string()).collect();
    println!(
        "head:           {}",
        if heads.is_empty() { "<none>".to_string() } else { heads.join(", ") }
    );
    match (out.orphan, out.pending) {
        _ if !out.tracking_table => println!("state:          uninitialized"),
        (true, _) => println!("state:          orphan (current revision not in migrations)"),
        (false, Some(0)) => println!("state:          up to date"),
        (false, Some(n)) => println!("state:          {n} pending"),
        (false, None) => println!("state:          unknown (graph has no single head)"),
    }
    Ok(())
}
