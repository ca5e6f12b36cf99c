//! Reconciliation decision table.
//!
//! | tracking table | intent    | first run  | action                    |
//! |----------------|-----------|------------|---------------------------|
//! | absent         | any       | `stamp`    | `BootstrapAndStamp` → head |
//! | absent         | any       | `discover` | `StampOnly` → walked head  |
//! | absent         | any       | `apply`    | `Upgrade` from base        |
//! | present        | normal    | any        | `Upgrade` stored → head    |
//! | present        | force-fix | any        | `DowngradeThenUpgrade`     |
//!
//! The force-fix row replays exactly one step: the stored revision is
//! downgraded to its parent and the chain is upgraded back to head. Steps
//! must be safe to reapply for this to be correct.

use crate::error::{GateError, Result};
use crate::graph::RevisionGraph;
use crate::revision::{Direction, Revision, RevisionId};
use crate::state::SchemaState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Operator intent, read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    #[default]
    Normal,
    ForceFix,
}

/// What to do when the tracking table does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstRun {
    /// Schema was provisioned out-of-band: record the graph head.
    #[default]
    Stamp,
    /// Same, but find the head by walking child links from the root.
    Discover,
    /// Empty store: run every step from the root.
    Apply,
}

impl FromStr for FirstRun {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stamp" => Ok(Self::Stamp),
            "discover" => Ok(Self::Discover),
            "apply" => Ok(Self::Apply),
            other => Err(GateError::InvalidConfig(format!(
                "unknown first-run policy '{other}' (expected stamp, discover or apply)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StampOnly,
    BootstrapAndStamp,
    Upgrade,
    DowngradeThenUpgrade,
    /// Operator-requested move to an earlier revision.
    Downgrade,
}

impl Action {
    pub fn is_stamp(self) -> bool {
        matches!(self, Self::StampOnly | Self::BootstrapAndStamp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StampOnly => "STAMP_ONLY",
            Self::BootstrapAndStamp => "BOOTSTRAP_AND_STAMP",
            Self::Upgrade => "UPGRADE",
            Self::DowngradeThenUpgrade => "DOWNGRADE_THEN_UPGRADE",
            Self::Downgrade => "DOWNGRADE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub direction: Direction,
    pub revision: Revision,
}

impl PlannedStep {
    fn new(direction: Direction, revision: &Revision) -> Self {
        Self {
            direction,
            revision: revision.clone(),
        }
    }
}

/// A transient, per-run reconciliation plan. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub action: Action,
    /// Tracked revision the plan was computed against.
    pub from: Option<RevisionId>,
    /// Revision the store should hold afterwards.
    pub to: Option<RevisionId>,
    /// Ordered steps; empty for stamp actions and for a store already at head.
    pub steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        !self.action.is_stamp() && self.steps.is_empty()
    }
}

fn forward(path: Vec<&Revision>) -> impl Iterator<Item = PlannedStep> + '_ {
    path.into_iter()
        .map(|r| PlannedStep::new(Direction::Forward, r))
}

// ---------------------------------------------------------------------------
// Decision engine
// ---------------------------------------------------------------------------

/// Pure decision: same inputs, same plan.
pub fn decide(
    state: &SchemaState,
    graph: &RevisionGraph,
    intent: Intent,
    first_run: FirstRun,
) -> Result<Plan> {
    if !state.exists {
        if intent == Intent::ForceFix {
            tracing::warn!("force-fix requested but no tracking table exists; nothing to replay");
        }
        return first_run_plan(graph, first_run);
    }

    let head = graph.head()?.clone();
    let stored = state.revision.clone();
    if let Some(rev) = &stored {
        if !graph.contains(rev) {
            return Err(GateError::OrphanRevision(rev.to_string()));
        }
    }

    if intent == Intent::ForceFix {
        match &stored {
            Some(rev) => {
                let tip = graph
                    .get(rev)
                    .ok_or_else(|| GateError::OrphanRevision(rev.to_string()))?;
                let mut steps = vec![PlannedStep::new(Direction::Backward, tip)];
                steps.extend(forward(graph.upgrade_path(tip.parent.as_ref(), &head)?));
                return Ok(Plan {
                    action: Action::DowngradeThenUpgrade,
                    from: stored.clone(),
                    to: Some(head),
                    steps,
                });
            }
            None => {
                tracing::warn!("force-fix requested but tracking table is empty; upgrading from base");
            }
        }
    }

    let steps = forward(graph.upgrade_path(stored.as_ref(), &head)?).collect();
    Ok(Plan {
        action: Action::Upgrade,
        from: stored,
        to: Some(head),
        steps,
    })
}

fn first_run_plan(graph: &RevisionGraph, first_run: FirstRun) -> Result<Plan> {
    match first_run {
        FirstRun::Stamp => Ok(Plan {
            action: Action::BootstrapAndStamp,
            from: None,
            to: Some(graph.head()?.clone()),
            steps: Vec::new(),
        }),
        FirstRun::Discover => Ok(Plan {
            action: Action::StampOnly,
            from: None,
            to: Some(graph.discover_head()?.clone()),
            steps: Vec::new(),
        }),
        FirstRun::Apply => {
            let head = graph.head()?.clone();
            let steps = forward(graph.upgrade_path(None, &head)?).collect();
            Ok(Plan {
                action: Action::Upgrade,
                from: None,
                to: Some(head),
                steps,
            })
        }
    }
}

/// Operator-requested downgrade from the stored revision to `target`
/// (`None` = base, removing every applied step).
pub fn downgrade_to(
    state: &SchemaState,
    graph: &RevisionGraph,
    target: Option<&RevisionId>,
) -> Result<Plan> {
    if let Some(t) = target {
        if !graph.contains(t) {
            return Err(GateError::UnknownRevision(t.to_string()));
        }
    }
    let Some(stored) = state.revision.clone() else {
        return match target {
            None => Ok(Plan {
                action: Action::Downgrade,
                from: None,
                to: None,
                steps: Vec::new(),
            }),
            Some(t) => Err(GateError::Unreachable {
                from: "<base>".to_string(),
                to: t.to_string(),
            }),
        };
    };
    if !graph.contains(&stored) {
        return Err(GateError::OrphanRevision(stored.to_string()));
    }
    let steps = graph
        .downgrade_path(&stored, target)?
        .into_iter()
        .map(|r| PlannedStep::new(Direction::Backward, r))
        .collect();
    Ok(Plan {
        action: Action::Downgrade,
        from: Some(stored),
        to: target.cloned(),
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn graph() -> RevisionGraph {
        RevisionGraph::new(vec![
            Revision::new(id("root"), None),
            Revision::new(id("v1"), Some(id("root"))),
            Revision::new(id("v2"), Some(id("v1"))),
        ])
        .unwrap()
    }

    fn steps(plan: &Plan) -> Vec<(Direction, String)> {
        plan.steps
            .iter()
            .map(|s| (s.direction, s.revision.id.to_string()))
            .collect()
    }

    use Direction::{Backward, Forward};

    #[test]
    fn fresh_store_bootstraps_to_head() {
        let plan = decide(&SchemaState::absent(), &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        assert_eq!(plan.action, Action::BootstrapAndStamp);
        assert_eq!(plan.to, Some(id("v2")));
        assert!(plan.steps.is_empty());
        assert!(!plan.is_noop());
    }

    #[test]
    fn discover_variant_stamps_walked_head() {
        let plan = decide(&SchemaState::absent(), &graph(), Intent::Normal, FirstRun::Discover).unwrap();
        assert_eq!(plan.action, Action::StampOnly);
        assert_eq!(plan.to, Some(id("v2")));
    }

    #[test]
    fn apply_variant_runs_every_step() {
        let plan = decide(&SchemaState::absent(), &graph(), Intent::Normal, FirstRun::Apply).unwrap();
        assert_eq!(plan.action, Action::Upgrade);
        assert_eq!(
            steps(&plan),
            [(Forward, "root".into()), (Forward, "v1".into()), (Forward, "v2".into())]
        );
    }

    #[test]
    fn behind_head_upgrades_one_step() {
        let plan = decide(&SchemaState::at(Some(id("v1"))), &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        assert_eq!(plan.action, Action::Upgrade);
        assert_eq!(plan.from, Some(id("v1")));
        assert_eq!(steps(&plan), [(Forward, "v2".to_string())]);
    }

    #[test]
    fn at_head_is_noop() {
        let plan = decide(&SchemaState::at(Some(id("v2"))), &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        assert_eq!(plan.action, Action::Upgrade);
        assert!(plan.is_noop());
    }

    #[test]
    fn empty_tracking_table_upgrades_from_base() {
        let plan = decide(&SchemaState::at(None), &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        assert_eq!(plan.steps.len(), 3);
    }

    #[test]
    fn force_fix_replays_tip() {
        let plan = decide(&SchemaState::at(Some(id("v2"))), &graph(), Intent::ForceFix, FirstRun::Stamp).unwrap();
        assert_eq!(plan.action, Action::DowngradeThenUpgrade);
        assert_eq!(steps(&plan), [(Backward, "v2".to_string()), (Forward, "v2".to_string())]);
        assert_eq!(plan.to, Some(id("v2")));
    }

    #[test]
    fn force_fix_behind_head_replays_one_then_upgrades() {
        let plan = decide(&SchemaState::at(Some(id("v1"))), &graph(), Intent::ForceFix, FirstRun::Stamp).unwrap();
        assert_eq!(
            steps(&plan),
            [(Backward, "v1".into()), (Forward, "v1".into()), (Forward, "v2".into())]
        );
    }

    #[test]
    fn force_fix_at_root_downgrades_to_base() {
        let plan = decide(&SchemaState::at(Some(id("root"))), &graph(), Intent::ForceFix, FirstRun::Stamp).unwrap();
        assert_eq!(steps(&plan)[0], (Backward, "root".to_string()));
        assert_eq!(plan.steps.len(), 4);
    }

    #[test]
    fn force_fix_without_tracking_table_uses_first_run_row() {
        let plan = decide(&SchemaState::absent(), &graph(), Intent::ForceFix, FirstRun::Stamp).unwrap();
        assert_eq!(plan.action, Action::BootstrapAndStamp);
    }

    #[test]
    fn orphan_and_ambiguous_are_fatal() {
        let err = decide(&SchemaState::at(Some(id("gone"))), &graph(), Intent::Normal, FirstRun::Stamp).unwrap_err();
        assert!(matches!(err, GateError::OrphanRevision(ref r) if r == "gone"));

        let forked = RevisionGraph::new(vec![
            Revision::new(id("root"), None),
            Revision::new(id("a"), Some(id("root"))),
            Revision::new(id("b"), Some(id("root"))),
        ])
        .unwrap();
        for state in [SchemaState::absent(), SchemaState::at(Some(id("root")))] {
            let err = decide(&state, &forked, Intent::Normal, FirstRun::Stamp).unwrap_err();
            assert!(matches!(err, GateError::AmbiguousHead(_)), "{err}");
        }
    }

    #[test]
    fn decision_is_deterministic() {
        let state = SchemaState::at(Some(id("root")));
        let a = decide(&state, &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        let b = decide(&state, &graph(), Intent::Normal, FirstRun::Stamp).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn operator_downgrade_walks_back_to_target() {
        let plan = downgrade_to(&SchemaState::at(Some(id("v2"))), &graph(), Some(&id("root"))).unwrap();
        assert_eq!(plan.action, Action::Downgrade);
        assert_eq!(steps(&plan), [(Backward, "v2".into()), (Backward, "v1".into())]);

        let err = downgrade_to(&SchemaState::at(Some(id("v1"))), &graph(), Some(&id("v2"))).unwrap_err();
        assert!(matches!(err, GateError::Unreachable { .. }));
    }

    #[test]
    fn first_run_policy_parses() {
        assert_eq!("discover".parse::<FirstRun>().unwrap(), FirstRun::Discover);
        assert!("yolo".parse::<FirstRun>().is_err());
    }

    #[test]
    fn plan_json_names_action_and_hides_sql() {
        let revisions = vec![
            Revision::new(id("root"), None),
            Revision::new(id("v1"), Some(id("root"))).with_sql("CREATE TABLE t (x);", "DROP TABLE t;"),
        ];
        let graph = RevisionGraph::new(revisions).unwrap();
        let plan = decide(&SchemaState::at(Some(id("root"))), &graph, Intent::Normal, FirstRun::Stamp).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["action"], "UPGRADE");
        assert_eq!(json["steps"][0]["direction"], "forward");
        assert_eq!(json["steps"][0]["revision"]["id"], "v1");
        assert!(json["steps"][0]["revision"].get("upgrade").is_none());
    }
}
