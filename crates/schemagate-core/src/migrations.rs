//! Loads the revision graph from a directory of migration files.
//!
//! One YAML document per revision:
//!
//! ```yaml
//! revision: beed49420ecd
//! down_revision: d563a53ac1cc
//! description: update job enums
//! upgrade: |
//!   ALTER TABLE jobs ADD COLUMN priority TEXT;
//! downgrade: |
//!   ALTER TABLE jobs DROP COLUMN priority;
//! ```

use crate::error::{GateError, Result};
use crate::graph::RevisionGraph;
use crate::revision::{Revision, RevisionId};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationFile {
    revision: String,
    #[serde(default)]
    down_revision: Option<String>,
    #[serde(default)]
    description: String,
    upgrade: String,
    #[serde(default)]
    downgrade: String,
}

/// Parse a single migration document. `origin` is only used in error messages.
pub fn parse_migration(origin: &str, text: &str) -> Result<Revision> {
    let file: MigrationFile =
        serde_yaml::from_str(text).map_err(|e| GateError::InvalidMigration {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
    let invalid = |reason: String| GateError::InvalidMigration {
        path: origin.to_string(),
        reason,
    };
    let id = RevisionId::new(file.revision).map_err(|e| invalid(e.to_string()))?;
    let parent = file
        .down_revision
        .map(RevisionId::new)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;
    if parent.as_ref() == Some(&id) {
        return Err(invalid("revision cannot revise itself".to_string()));
    }
    Ok(Revision {
        id,
        parent,
        description: file.description,
        upgrade: file.upgrade,
        downgrade: file.downgrade,
    })
}

fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every migration in `dir` and build the validated graph.
pub fn load_dir(dir: &Path) -> Result<RevisionGraph> {
    if !dir.is_dir() {
        return Err(GateError::InvalidMigration {
            path: dir.display().to_string(),
            reason: "migrations directory not found".to_string(),
        });
    }
    let mut revisions = Vec::new();
    for path in migration_files(dir)? {
        let text = std::fs::read_to_string(&path)?;
        revisions.push(parse_migration(&path.display().to_string(), &text)?);
    }
    tracing::debug!(dir = %dir.display(), count = revisions.len(), "loaded migrations");
    RevisionGraph::new(revisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROOT: &str = "revision: root\ndescription: initial\nupgrade: CREATE TABLE jobs (id INTEGER);\ndowngrade: DROP TABLE jobs;\n";
    const V1: &str = "revision: v1\ndown_revision: root\nupgrade: ALTER TABLE jobs ADD COLUMN kind TEXT;\n";

    #[test]
    fn parses_root_and_child() {
        let root = parse_migration("root.yaml", ROOT).unwrap();
        assert_eq!(root.id.as_str(), "root");
        assert!(root.parent.is_none());
        assert_eq!(root.description, "initial");

        let v1 = parse_migration("v1.yaml", V1).unwrap();
        assert_eq!(v1.parent.as_ref().map(|p| p.as_str()), Some("root"));
        assert!(v1.downgrade.is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_bad_ids() {
        let err = parse_migration("x.yaml", "revision: a\nupgrade: ''\nbranch_labels: x\n").unwrap_err();
        assert!(err.to_string().contains("x.yaml"), "{err}");
        assert!(matches!(
            parse_migration("y.yaml", "revision: a-b\nupgrade: ''\n"),
            Err(GateError::InvalidMigration { .. })
        ));
        assert!(matches!(
            parse_migration("z.yaml", "revision: a\ndown_revision: a\nupgrade: ''\n"),
            Err(GateError::InvalidMigration { .. })
        ));
    }

    #[test]
    fn load_dir_builds_graph_and_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("0001_root.yaml"), ROOT).unwrap();
        std::fs::write(dir.path().join("0002_v1.yml"), V1).unwrap();
        std::fs::write(dir.path().join("README.md"), "notes").unwrap();

        let graph = load_dir(dir.path()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.head().unwrap().as_str(), "v1");
    }

    #[test]
    fn load_dir_missing_directory_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = load_dir(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
