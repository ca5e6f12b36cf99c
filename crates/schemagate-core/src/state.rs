use crate::error::Result;
use crate::revision::RevisionId;
use crate::store::MigrationStore;
use serde::Serialize;

/// What the store says about schema tracking right now.
///
/// `exists == false` (no tracking table) is a different condition from a
/// tracking table that exists but holds no revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaState {
    pub exists: bool,
    pub revision: Option<RevisionId>,
}

impl SchemaState {
    pub fn absent() -> Self {
        Self {
            exists: false,
            revision: None,
        }
    }

    pub fn at(revision: Option<RevisionId>) -> Self {
        Self {
            exists: true,
            revision,
        }
    }
}

/// Read-only probe: metadata lookup for the tracking table, then the scalar.
pub fn probe<S: MigrationStore + ?Sized>(store: &mut S) -> Result<SchemaState> {
    if !store.probe_tracking_table()? {
        tracing::debug!("tracking table absent");
        return Ok(SchemaState::absent());
    }
    let revision = store.read_revision()?;
    tracing::debug!(revision = ?revision.as_ref().map(|r| r.as_str()), "tracking table present");
    Ok(SchemaState::at(revision))
}
