use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Command;

use schemagate_core::cancel::CancelToken;

/// First inherited descriptor under the socket-activation convention.
#[cfg(unix)]
const LISTEN_FDS_START: i32 = 3;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("no service command given (pass it after `--`)")]
    NoCommand,

    #[error("service program '{0}' not found on PATH")]
    NotFound(String),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot pass the listening socket to the service: {0}")]
    Inherit(String),

    #[error("failed to start '{program}': {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("termination requested before the service started")]
    Cancelled,
}

impl HandoffError {
    pub fn exit_code(&self) -> i32 {
        match self {
            HandoffError::Cancelled => 130,
            _ => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// A service command resolved and ready to take over the process.
///
/// Prepared before reconciliation starts so a missing binary or a taken port
/// fails the deploy before any schema change.
#[derive(Debug)]
pub struct Launch {
    program: PathBuf,
    args: Vec<String>,
    host: String,
    port: u16,
    listener: Option<TcpListener>,
}

impl Launch {
    pub fn prepare(
        argv: &[String],
        host: &str,
        port: u16,
        inherit_socket: bool,
    ) -> Result<Self, HandoffError> {
        let (name, rest) = argv.split_first().ok_or(HandoffError::NoCommand)?;
        let program = which::which(name).map_err(|_| HandoffError::NotFound(name.clone()))?;

        let (listener, port) = if inherit_socket {
            let addr = format!("{host}:{port}");
            let listener = TcpListener::bind(&addr).map_err(|source| HandoffError::Bind {
                addr: addr.clone(),
                source,
            })?;
            let bound = listener
                .local_addr()
                .map_err(|source| HandoffError::Bind { addr, source })?
                .port();
            (Some(listener), bound)
        } else {
            (None, port)
        };

        Ok(Self {
            program,
            args: rest
                .iter()
                .map(|arg| substitute(arg, host, port))
                .collect(),
            host: host.to_string(),
            port,
            listener,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("HOST", &self.host)
            .env("PORT", self.port.to_string())
            .env("BIND_ADDRESS", self.bind_address());
        cmd
    }

    /// Replace this process with the service. Only returns on failure, or
    /// with `Cancelled` when a termination signal arrived after
    /// reconciliation finished.
    #[cfg(unix)]
    pub fn hand_off(self, cancel: &CancelToken) -> Result<i32, HandoffError> {
        use std::os::unix::process::CommandExt;

        let mut cmd = self.command();
        if let Some(listener) = &self.listener {
            inherit_listener(listener)?;
            cmd.env("LISTEN_FDS", "1")
                .env("LISTEN_PID", std::process::id().to_string());
        }
        tracing::info!(
            program = %self.program.display(),
            bind = %self.bind_address(),
            inherited_socket = self.listener.is_some(),
            "handing off to service"
        );
        if cancel.is_cancelled() {
            return Err(HandoffError::Cancelled);
        }
        let source = cmd.exec();
        Err(HandoffError::Exec {
            program: self.program.display().to_string(),
            source,
        })
    }

    /// No exec here: run the service as a child and report its exit status.
    #[cfg(not(unix))]
    pub fn hand_off(self, cancel: &CancelToken) -> Result<i32, HandoffError> {
        if cancel.is_cancelled() {
            return Err(HandoffError::Cancelled);
        }
        if self.listener.is_some() {
            tracing::warn!("socket inheritance is only supported on Unix; the service binds its own port");
        }
        let mut cmd = self.command();
        let program = self.program.display().to_string();
        tracing::info!(%program, bind = %self.bind_address(), "starting service");
        drop(self.listener);
        let status = cmd
            .status()
            .map_err(|source| HandoffError::Exec { program, source })?;
        Ok(status.code().unwrap_or(1))
    }
}

/// Put `listener` at fd 3 and keep it open across exec.
#[cfg(unix)]
fn inherit_listener(listener: &TcpListener) -> Result<(), HandoffError> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let fd = listener.as_raw_fd();
    if fd != LISTEN_FDS_START {
        nix::unistd::dup2(fd, LISTEN_FDS_START)
            .map_err(|e| HandoffError::Inherit(format!("dup2: {e}")))?;
    }
    fcntl(LISTEN_FDS_START, FcntlArg::F_SETFD(FdFlag::empty()))
        .map_err(|e| HandoffError::Inherit(format!("fcntl: {e}")))?;
    Ok(())
}

/// Expand `{host}`, `{port}` and `{bind}` in one service argument.
pub fn substitute(arg: &str, host: &str, port: u16) -> String {
    arg.replace("{bind}", &format!("{host}:{port}"))
        .replace("{host}", host)
        .replace("{port}", &port.to_string())
}
