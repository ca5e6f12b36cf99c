use crate::cmd::reconcile_once;
use crate::handoff::Launch;
use crate::output::rev;
use crate::signals::SignalWatch;
use schemagate_core::cancel::CancelToken;
use schemagate_core::config::Config;
use schemagate_core::GateError;

pub struct RunArgs {
    pub host: String,
    pub port: u16,
    pub inherit_socket: bool,
    pub service: Vec<String>,
}

/// Reconcile, then replace this process with the service. The service is
/// never started when reconciliation fails or is cancelled.
pub fn run(config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let launch = Launch::prepare(&args.service, &args.host, args.port, args.inherit_socket)?;

    // Watched until exec: a signal between reconcile and handoff still counts.
    let cancel = CancelToken::new();
    let _signals = SignalWatch::start(cancel.clone())?;

    let report = reconcile_once(config, cancel.clone())?;
    if cancel.is_cancelled() {
        return Err(GateError::Cancelled.into());
    }
    tracing::info!(
        action = %report.plan.action,
        revision = %rev(report.outcome.revision.as_ref()),
        applied = report.outcome.applied.len(),
        "schema reconciled"
    );

    let code = launch.hand_off(&cancel)?;
    std::process::exit(code);
}
