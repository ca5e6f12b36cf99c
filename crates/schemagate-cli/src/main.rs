mod cmd;
mod handoff;
mod output;
mod settings;
mod signals;

use clap::{Parser, Subcommand};
use handoff::HandoffError;
use schemagate_core::GateError;
use settings::StoreArgs;

#[derive(Parser)]
#[command(
    name = "schemagate",
    about = "Reconcile the database schema to the migration head, then hand off to the service",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, then exec the service command given after `--`
    Run {
        /// Address the service should bind
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port the service should listen on
        #[arg(long, env = "PORT", default_value = "8000")]
        port: u16,

        /// Bind the listening socket here and pass it to the service as fd 3
        #[arg(long)]
        inherit_socket: bool,

        /// Service command; `{host}`, `{port}` and `{bind}` are substituted
        #[arg(last = true, required = true)]
        service: Vec<String>,
    },

    /// Reconcile the schema without starting anything
    Upgrade,

    /// Show what `upgrade` would do
    Plan,

    /// Show the tracked revision and how far it is from head
    Status,

    /// List the heads of the migration graph
    Heads,

    /// List every revision in order
    History,

    /// Step the schema back to a revision (or `base`)
    Downgrade { target: String },
}

fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(gate) = e.downcast_ref::<GateError>() {
        return gate.exit_code();
    }
    if let Some(handoff) = e.downcast_ref::<HandoffError>() {
        return handoff.exit_code();
    }
    1
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Upgrade | Commands::Downgrade { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = cli.store.resolve().and_then(|config| match cli.command {
        Commands::Run {
            host,
            port,
            inherit_socket,
            service,
        } => cmd::run::run(
            &config,
            cmd::run::RunArgs {
                host,
                port,
                inherit_socket,
                service,
            },
        ),
        Commands::Upgrade => cmd::upgrade::run(&config, cli.json),
        Commands::Plan => cmd::plan::run(&config, cli.json),
        Commands::Status => cmd::status::run(&config, cli.json),
        Commands::Heads => cmd::history::heads(&config, cli.json),
        Commands::History => cmd::history::history(&config, cli.json),
        Commands::Downgrade { target } => cmd::downgrade::run(&config, &target, cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}
