//! SIGTERM/SIGINT before handoff cancel the reconciliation.

use schemagate_core::cancel::CancelToken;

/// Background runtime listening for termination signals. Handlers it
/// installs revert to their defaults at exec, so it may stay up until the
/// service takes over.
pub struct SignalWatch {
    runtime: tokio::runtime::Runtime,
}

impl SignalWatch {
    pub fn start(cancel: CancelToken) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("schemagate-signals")
            .enable_all()
            .build()?;

        runtime.spawn(async move {
            wait_for_signal().await;
            tracing::warn!("termination requested; abandoning reconciliation");
            cancel.cancel();
        });

        Ok(Self { runtime })
    }

    pub fn stop(self) {
        self.runtime.shutdown_background();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "cannot install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}
