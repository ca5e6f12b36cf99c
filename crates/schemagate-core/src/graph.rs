//! Static revision DAG.
//!
//! Every revision names at most one parent, so the graph is a forest. A
//! deployable graph has exactly one head (a revision nobody revises); with a
//! single head the forest collapses into one chain from root to head.

use std::collections::BTreeMap;

use crate::error::{GateError, Result};
use crate::revision::{Revision, RevisionId};

#[derive(Debug, Clone, Default)]
pub struct RevisionGraph {
    revisions: BTreeMap<RevisionId, Revision>,
    children: BTreeMap<RevisionId, Vec<RevisionId>>,
}

impl RevisionGraph {
    /// Build and validate a graph: ids unique, parents known, no cycles.
    pub fn new(revisions: Vec<Revision>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for rev in revisions {
            if by_id.contains_key(&rev.id) {
                return Err(GateError::DuplicateRevision(rev.id.to_string()));
            }
            by_id.insert(rev.id.clone(), rev);
        }

        let mut children: BTreeMap<RevisionId, Vec<RevisionId>> = BTreeMap::new();
        for rev in by_id.values() {
            if let Some(parent) = &rev.parent {
                if !by_id.contains_key(parent) {
                    return Err(GateError::MissingParent {
                        revision: rev.id.to_string(),
                        parent: parent.to_string(),
                    });
                }
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(rev.id.clone());
            }
        }

        let graph = Self {
            revisions: by_id,
            children,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<()> {
        let limit = self.revisions.len();
        for start in self.revisions.keys() {
            let mut cursor = Some(start);
            let mut hops = 0usize;
            while let Some(id) = cursor {
                hops += 1;
                if hops > limit {
                    return Err(GateError::Cycle(start.to_string()));
                }
                cursor = self.revisions.get(id).and_then(|r| r.parent.as_ref());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn get(&self, id: &RevisionId) -> Option<&Revision> {
        self.revisions.get(id)
    }

    pub fn contains(&self, id: &RevisionId) -> bool {
        self.revisions.contains_key(id)
    }

    pub fn children_of(&self, id: &RevisionId) -> &[RevisionId] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Revisions with no children, in id order.
    pub fn heads(&self) -> Vec<&RevisionId> {
        self.revisions
            .keys()
            .filter(|id| self.children_of(id).is_empty())
            .collect()
    }

    pub fn roots(&self) -> Vec<&RevisionId> {
        self.revisions
            .values()
            .filter(|r| r.parent.is_none())
            .map(|r| &r.id)
            .collect()
    }

    pub fn is_head(&self, id: &RevisionId) -> bool {
        self.contains(id) && self.children_of(id).is_empty()
    }

    /// The single head of the graph.
    pub fn head(&self) -> Result<&RevisionId> {
        let heads = self.heads();
        match heads.as_slice() {
            [] => Err(GateError::EmptyGraph),
            [only] => Ok(*only),
            many => Err(GateError::AmbiguousHead(
                many.iter().map(|id| id.to_string()).collect(),
            )),
        }
    }

    /// Find the head by walking from the root through child links until a
    /// revision with no child is reached.
    pub fn discover_head(&self) -> Result<&RevisionId> {
        let roots = self.roots();
        let mut cursor = match roots.as_slice() {
            [] => return Err(GateError::EmptyGraph),
            [root] => *root,
            _ => return Err(self.ambiguous()),
        };
        loop {
            match self.children_of(cursor) {
                [] => return Ok(cursor),
                [next] => cursor = next,
                _ => return Err(self.ambiguous()),
            }
        }
    }

    fn ambiguous(&self) -> GateError {
        GateError::AmbiguousHead(self.heads().iter().map(|id| id.to_string()).collect())
    }

    /// Revisions to apply forward to move from `from` (`None` = empty schema)
    /// to `to`, in parent→child order. Empty when `from == to`.
    pub fn upgrade_path(&self, from: Option<&RevisionId>, to: &RevisionId) -> Result<Vec<&Revision>> {
        let mut path = Vec::new();
        let mut cursor = Some(to);
        while cursor != from {
            let Some(id) = cursor else {
                return Err(GateError::Unreachable {
                    from: crate::error::display_rev(from),
                    to: to.to_string(),
                });
            };
            let rev = self
                .get(id)
                .ok_or_else(|| GateError::UnknownRevision(id.to_string()))?;
            path.push(rev);
            cursor = rev.parent.as_ref();
        }
        path.reverse();
        Ok(path)
    }

    /// Revisions to apply backward to move from `from` down to `to`
    /// (`None` = empty schema), in child→parent order.
    pub fn downgrade_path(&self, from: &RevisionId, to: Option<&RevisionId>) -> Result<Vec<&Revision>> {
        let mut path = self.upgrade_path(to, from).map_err(|e| match e {
            GateError::Unreachable { .. } => GateError::Unreachable {
                from: from.to_string(),
                to: crate::error::display_rev(to),
            },
            other => other,
        })?;
        path.reverse();
        Ok(path)
    }

    /// All revisions in topological (parent→child) order.
    pub fn history(&self) -> Vec<&Revision> {
        let mut out = Vec::with_capacity(self.revisions.len());
        let mut stack: Vec<&RevisionId> = self.roots().into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(rev) = self.get(id) {
                out.push(rev);
            }
            for child in self.children_of(id).iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}
