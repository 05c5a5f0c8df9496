//! Dense adjacency view of a goal's causal graph.
//!
//! Node 0 is always the goal; milestones follow in creation order. The view
//! is rebuilt wholesale from the [`Goal`] and never patched in place.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::types::Goal;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Ordered node sequence plus a square 0/1 matrix.
///
/// `matrix[i][j] == 1` means node `i` causally enables node `j`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AdjacencyView {
    /// Node ids, goal first
    pub nodes: Vec<String>,
    /// Display labels aligned with `nodes`
    pub labels: Vec<String>,
    /// Square adjacency matrix
    pub matrix: Vec<Vec<u8>>,
    /// Goal generation this view was built from
    pub generation: u64,
}

impl AdjacencyView {
    /// Build the view for a goal.
    pub fn build(goal: &Goal) -> Self {
        let ordered = goal.milestones_ordered();
        let mut nodes = Vec::with_capacity(ordered.len() + 1);
        let mut labels = Vec::with_capacity(ordered.len() + 1);
        nodes.push(goal.id.clone());
        labels.push(goal.title.clone());
        for m in &ordered {
            nodes.push(m.id.clone());
            labels.push(m.name.clone());
        }

        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let n = nodes.len();
        let mut matrix = vec![vec![0u8; n]; n];

        let has_causal_data = goal.causal_relationships().next().is_some();

        for (offset, m) in ordered.iter().enumerate() {
            let j = offset + 1;
            let has_causal_predecessor = m
                .causal_relationships
                .iter()
                .any(|r| r.prerequisite_id != goal.id && index.contains_key(r.prerequisite_id.as_str()));

            if !has_causal_predecessor || !has_causal_data {
                matrix[0][j] = 1;
            }

            for rel in &m.causal_relationships {
                if rel.prerequisite_id == goal.id {
                    continue;
                }
                if let Some(&i) = index.get(rel.prerequisite_id.as_str()) {
                    matrix[i][j] = 1;
                }
            }
        }

        if connect_orphaned_goal(&mut matrix) {
            warn!(goal_id = %goal.id, nodes = n, "Goal had no outgoing edges; connected to every milestone");
        }

        debug!(goal_id = %goal.id, nodes = n, generation = goal.generation(), "Built adjacency view");

        Self {
            nodes,
            labels,
            matrix,
            generation: goal.generation(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn goal_id(&self) -> &str {
        self.nodes.first().map(String::as_str).unwrap_or_default()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n == id)
    }

    pub fn node(&self, i: usize) -> Option<&str> {
        self.nodes.get(i).map(String::as_str)
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.matrix
            .get(i)
            .and_then(|row| row.get(j))
            .is_some_and(|v| *v == 1)
    }

    pub fn successors(&self, i: usize) -> Vec<usize> {
        self.matrix
            .get(i)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, v)| **v == 1)
                    .map(|(j, _)| j)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn predecessors(&self, j: usize) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.has_edge(i, j)).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.matrix
            .iter()
            .map(|row| row.iter().filter(|v| **v == 1).count())
            .sum()
    }

    /// Directed edges as `(from, to)` index pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        (0..self.len())
            .flat_map(|i| self.successors(i).into_iter().map(move |j| (i, j)))
            .collect()
    }

    /// Neighbours in the undirected projection.
    pub fn undirected_neighbors(&self, i: usize) -> BTreeSet<usize> {
        let mut out: BTreeSet<usize> = self.successors(i).into_iter().collect();
        out.extend(self.predecessors(i));
        out.remove(&i);
        out
    }

    /// SHA-256 over node order and matrix contents.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.as_bytes());
            hasher.update([0u8]);
        }
        for row in &self.matrix {
            hasher.update(row);
        }
        hex::encode(hasher.finalize())
    }
}

/// Degenerate-input policy: when the goal (row 0) has no outgoing edges but
/// milestones exist, connect it to every milestone. Returns whether it fired.
pub fn connect_orphaned_goal(matrix: &mut [Vec<u8>]) -> bool {
    let Some(goal_row) = matrix.first_mut() else {
        return false;
    };
    if goal_row.len() <= 1 || goal_row.iter().any(|v| *v == 1) {
        return false;
    }
    for cell in goal_row.iter_mut().skip(1) {
        *cell = 1;
    }
    true
}

/// Holds the last built view and refuses to serve it once stale.
#[derive(Debug, Clone, Default)]
pub struct ViewCache {
    view: Option<AdjacencyView>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the goal, replacing any previous view.
    pub fn rebuild(&mut self, goal: &Goal) -> &AdjacencyView {
        self.view.insert(AdjacencyView::build(goal))
    }

    /// The current view; reading before a build, or after a mutation the
    /// cache has not seen, is an invariant violation.
    pub fn get(&self, goal: &Goal) -> Result<&AdjacencyView> {
        match &self.view {
            None => Err(GraphError::InvariantViolation(format!(
                "adjacency view for goal '{}' read before first build",
                goal.id
            ))),
            Some(view) if view.generation != goal.generation() || view.goal_id() != goal.id => {
                Err(GraphError::InvariantViolation(format!(
                    "adjacency view for goal '{}' is stale (built at {}, goal at {})",
                    goal.id,
                    view.generation,
                    goal.generation()
                )))
            }
            Some(view) => Ok(view),
        }
    }

    pub fn invalidate(&mut self) {
        self.view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CausalRelationship, Milestone, RelationshipType};

    fn chain_goal() -> (Goal, Vec<String>) {
        let mut goal = Goal::new("g", "Goal");
        let a = goal.add_milestone("A", 5, None, None).unwrap();
        let b = goal.add_milestone("B", 5, Some(&a), None).unwrap();
        let c = goal.add_milestone("C", 5, Some(&b), None).unwrap();
        (goal, vec![a, b, c])
    }

    #[test]
    fn test_build_chain() {
        let (goal, ids) = chain_goal();
        let view = AdjacencyView::build(&goal);
        assert_eq!(view.len(), 4);
        assert_eq!(view.goal_id(), "g");

        let a = view.index_of(&ids[0]).unwrap();
        let b = view.index_of(&ids[1]).unwrap();
        let c = view.index_of(&ids[2]).unwrap();
        assert!(view.has_edge(0, a));
        assert!(!view.has_edge(0, b));
        assert!(!view.has_edge(0, c));
        assert!(view.has_edge(a, b));
        assert!(view.has_edge(b, c));
        assert_eq!(view.edge_count(), 3);
    }

    #[test]
    fn test_no_causal_data_connects_goal_to_all() {
        let mut goal = Goal::new("g", "Goal");
        goal.add_milestone("A", 5, None, None).unwrap();
        goal.add_milestone("B", 5, None, None).unwrap();
        let view = AdjacencyView::build(&goal);
        assert_eq!(view.successors(0), vec![1, 2]);
    }

    #[test]
    fn test_orphaned_goal_policy() {
        let mut matrix = vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0]];
        assert!(connect_orphaned_goal(&mut matrix));
        assert_eq!(matrix[0], vec![0, 1, 1]);
        assert!(!connect_orphaned_goal(&mut matrix));

        let mut lone = vec![vec![0]];
        assert!(!connect_orphaned_goal(&mut lone));
    }

    #[test]
    fn test_cycle_falls_back_to_goal_edges() {
        // A -> B -> C -> A: every milestone has a causal predecessor
        let mut goal = Goal::new("g", "Goal");
        let ids: Vec<String> = ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, name)| format!("m{}_{}", i, name))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            let prev = &ids[(i + 2) % 3];
            let mut m = Milestone::new(id.clone(), id.clone(), 5);
            m.predecessors.push(prev.clone());
            m.causal_relationships.push(CausalRelationship {
                prerequisite_id: prev.clone(),
                dependent_id: id.clone(),
                relationship_type: RelationshipType::Enables,
                strength: 0.5,
                confidence: 0.5,
                bidirectional: false,
            });
            goal.milestones.insert(id.clone(), m);
        }
        let view = AdjacencyView::build(&goal);
        assert_eq!(view.successors(0).len(), 3);
        assert_eq!(view.edge_count(), 6);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (goal, _) = chain_goal();
        let first = AdjacencyView::build(&goal);
        let second = AdjacencyView::build(&goal);
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_on_mutation() {
        let (mut goal, ids) = chain_goal();
        let before = AdjacencyView::build(&goal).fingerprint();
        goal.connect_milestones(&ids[0], &ids[2], None).unwrap();
        assert_ne!(before, AdjacencyView::build(&goal).fingerprint());
    }

    #[test]
    fn test_view_cache_staleness() {
        let (mut goal, ids) = chain_goal();
        let mut cache = ViewCache::new();
        assert!(matches!(cache.get(&goal), Err(GraphError::InvariantViolation(_))));

        cache.rebuild(&goal);
        assert!(cache.get(&goal).is_ok());

        goal.record_vote(&ids[0], "u1", true, 1.0).unwrap();
        assert!(cache.get(&goal).is_err());
        cache.rebuild(&goal);
        assert!(cache.get(&goal).is_ok());
    }

    #[test]
    fn test_empty_goal_view() {
        let goal = Goal::new("g", "Goal");
        let view = AdjacencyView::build(&goal);
        assert_eq!(view.len(), 1);
        assert_eq!(view.edge_count(), 0);
    }
}
