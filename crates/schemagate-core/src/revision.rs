use crate::error::{GateError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RevisionId
// ---------------------------------------------------------------------------

/// Opaque identifier of one migration step (usually a short content hash).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

static REVISION_RE: OnceLock<Regex> = OnceLock::new();

fn id_pattern() -> &'static Regex {
    REVISION_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap())
}

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !id_pattern().is_match(&id) {
            return Err(GateError::InvalidRevisionId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RevisionId {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "upgrade",
            Self::Backward => "downgrade",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// One node of the revision graph, with the SQL that moves the schema across it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    /// `None` only for the root revision.
    pub parent: Option<RevisionId>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing)]
    pub upgrade: String,
    #[serde(default, skip_serializing)]
    pub downgrade: String,
}

impl Revision {
    pub fn new(id: RevisionId, parent: Option<RevisionId>) -> Self {
        Self {
            id,
            parent,
            description: String::new(),
            upgrade: String::new(),
            downgrade: String::new(),
        }
    }

    pub fn with_sql(mut self, upgrade: impl Into<String>, downgrade: impl Into<String>) -> Self {
        self.upgrade = upgrade.into();
        self.downgrade = downgrade.into();
        self
    }

    pub fn sql(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.upgrade,
            Direction::Backward => &self.downgrade,
        }
    }

    /// Revision the tracking cell must hold before a step in `direction` runs.
    pub fn expected_before(&self, direction: Direction) -> Option<&RevisionId> {
        match direction {
            Direction::Forward => self.parent.as_ref(),
            Direction::Backward => Some(&self.id),
        }
    }

    /// Revision the tracking cell holds after a step in `direction` commits.
    pub fn resulting(&self, direction: Direction) -> Option<&RevisionId> {
        match direction {
            Direction::Forward => Some(&self.id),
            Direction::Backward => self.parent.as_ref(),
        }
    }
}
