use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("unsupported database url '{0}': expected sqlite://<path>")]
    UnsupportedStore(String),

    #[error("revision graph has {} heads ({}); merge them before deploying", .0.len(), .0.join(", "))]
    AmbiguousHead(Vec<String>),

    #[error("stored revision '{0}' is not present in the revision graph")]
    OrphanRevision(String),

    #[error("revision graph is empty: no migrations found")]
    EmptyGraph,

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("invalid revision id '{0}': must be alphanumeric or underscore")]
    InvalidRevisionId(String),

    #[error("duplicate revision '{0}'")]
    DuplicateRevision(String),

    #[error("revision '{revision}' revises unknown revision '{parent}'")]
    MissingParent { revision: String, parent: String },

    #[error("revision graph contains a cycle through '{0}'")]
    Cycle(String),

    #[error("revision '{to}' is not reachable from '{from}'")]
    Unreachable { from: String, to: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid migration {path}: {reason}")]
    InvalidMigration { path: String, reason: String },

    #[error("{direction} step for revision '{revision}' failed: {reason}")]
    Execution {
        revision: String,
        direction: String,
        reason: String,
    },

    #[error("{direction} step for revision '{revision}' exceeded {secs}s and was rolled back")]
    StepTimeout {
        revision: String,
        direction: String,
        secs: u64,
    },

    #[error("concurrent reconciliation: expected revision {expected}, store holds {found}")]
    ConcurrentReconciliation { expected: String, found: String },

    #[error("reconciliation lease held by {holder} (expires {expires_at}); gave up after {waited_secs}s")]
    LockTimeout {
        holder: String,
        expires_at: String,
        waited_secs: u64,
    },

    #[error("reconciliation lease lost to {holder} mid-run")]
    LeaseLost { holder: String },

    #[error("cancelled before handoff")]
    Cancelled,

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Process exit status the deployment system sees for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StoreUnreachable(_) | Self::UnsupportedStore(_) => 1,
            Self::AmbiguousHead(_)
            | Self::OrphanRevision(_)
            | Self::EmptyGraph
            | Self::UnknownRevision(_)
            | Self::InvalidRevisionId(_)
            | Self::DuplicateRevision(_)
            | Self::MissingParent { .. }
            | Self::Cycle(_)
            | Self::Unreachable { .. }
            | Self::InvalidMigration { .. }
            | Self::InvalidConfig(_)
            | Self::Io(_) => 2,
            Self::Execution { .. } | Self::StepTimeout { .. } | Self::Store(_) => 3,
            Self::ConcurrentReconciliation { .. }
            | Self::LockTimeout { .. }
            | Self::LeaseLost { .. } => 4,
            Self::Cancelled => 130,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;

/// Render an optional revision the way operators read it in logs.
pub(crate) fn display_rev<T: std::fmt::Display>(rev: Option<&T>) -> String {
    rev.map(|r| r.to_string())
        .unwrap_or_else(|| "<base>".to_string())
}
