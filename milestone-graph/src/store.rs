//! Graph store: owns every mutation of persons, goals and milestones.
//!
//! All milestone mutations run through [`Goal::transact`], which stages the
//! change on a copy of the milestone map, re-checks the
//! predecessors/relationship invariant, and only then commits. A rejected
//! operation never leaves partial state behind.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::types::{
    EdgeSpec, Goal, Milestone, Person, Vote, VoteSummary, MAX_SCORE, MIN_SCORE,
};

/// Normalized form used for duplicate-name detection.
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..4].to_string()
}

/// Milestone id in the `ms_<goal>_<n>_<hex>` shape.
pub fn milestone_id(goal_id: &str, n: usize) -> String {
    format!("ms_{}_{}_{}", goal_id, n, short_hex())
}

fn new_goal_id() -> String {
    format!("goal_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn validate_score(score: u8) -> Result<()> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(GraphError::InvalidInput(format!(
            "score {} outside {}..={}",
            score, MIN_SCORE, MAX_SCORE
        )));
    }
    Ok(())
}

/// In-memory state of every person the caller has referenced.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    persons: BTreeMap<String, Person>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn person(&self, id: &str) -> Result<&Person> {
        self.persons
            .get(id)
            .ok_or_else(|| GraphError::person_not_found(id))
    }

    /// Get a person, creating them on first reference.
    pub fn person_mut(&mut self, id: &str) -> &mut Person {
        self.persons.entry(id.to_string()).or_insert_with(|| {
            info!(person_id = %id, "Created person");
            Person::new(id)
        })
    }

    pub fn insert_person(&mut self, person: Person) {
        self.persons.insert(person.id.clone(), person);
    }

    pub fn remove_person(&mut self, id: &str) -> Result<Person> {
        self.persons
            .remove(id)
            .ok_or_else(|| GraphError::person_not_found(id))
    }

    pub fn persons(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }

    pub fn goal(&self, person_id: &str, goal_id: &str) -> Result<&Goal> {
        self.person(person_id)?.goal(goal_id)
    }

    pub fn goal_mut(&mut self, person_id: &str, goal_id: &str) -> Result<&mut Goal> {
        self.persons
            .get_mut(person_id)
            .ok_or_else(|| GraphError::person_not_found(person_id))?
            .goal_mut(goal_id)
    }
}

impl Person {
    pub fn goal(&self, id: &str) -> Result<&Goal> {
        self.goals.get(id).ok_or_else(|| GraphError::goal_not_found(id))
    }

    pub fn goal_mut(&mut self, id: &str) -> Result<&mut Goal> {
        self.goals
            .get_mut(id)
            .ok_or_else(|| GraphError::goal_not_found(id))
    }

    /// Goal ids in display order.
    pub fn goal_ids(&self) -> &[String] {
        &self.goal_order
    }

    pub fn ordered_goals(&self) -> Vec<&Goal> {
        self.goal_order
            .iter()
            .filter_map(|id| self.goals.get(id))
            .collect()
    }

    /// Create a goal with a generated id at the end of the order.
    pub fn create_goal(&mut self, title: &str) -> String {
        self.insert_goal_at_end(title)
    }

    /// Insert a goal built elsewhere (e.g. loaded), appended to the order.
    pub fn insert_goal(&mut self, goal: Goal) {
        if !self.goal_order.contains(&goal.id) {
            self.goal_order.push(goal.id.clone());
        }
        self.goals.insert(goal.id.clone(), goal);
    }

    pub fn insert_goal_at_beginning(&mut self, title: &str) -> String {
        self.place_goal(title, 0)
    }

    pub fn insert_goal_at_end(&mut self, title: &str) -> String {
        self.place_goal(title, self.goal_order.len())
    }

    /// Insert a new goal directly after `left`, which must precede `right`.
    pub fn insert_goal_between(&mut self, left: &str, right: &str, title: &str) -> Result<String> {
        let left_pos = self.position(left)?;
        let right_pos = self.position(right)?;
        if left_pos >= right_pos {
            return Err(GraphError::InvalidInput(format!(
                "goal '{}' does not precede '{}'",
                left, right
            )));
        }
        Ok(self.place_goal(title, left_pos + 1))
    }

    pub fn remove_goal(&mut self, id: &str) -> Result<Goal> {
        let goal = self
            .goals
            .remove(id)
            .ok_or_else(|| GraphError::goal_not_found(id))?;
        self.goal_order.retain(|g| g != id);
        info!(person_id = %self.id, goal_id = %id, "Removed goal");
        Ok(goal)
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.goal_order
            .iter()
            .position(|g| g == id)
            .ok_or_else(|| GraphError::goal_not_found(id))
    }

    fn place_goal(&mut self, title: &str, index: usize) -> String {
        let id = new_goal_id();
        self.goals.insert(id.clone(), Goal::new(id.clone(), title));
        self.goal_order.insert(index.min(self.goal_order.len()), id.clone());
        info!(person_id = %self.id, goal_id = %id, title = %title, "Created goal");
        id
    }
}

/// Working copy of a goal's milestones during a mutation.
struct Staged {
    goal_id: String,
    milestones: BTreeMap<String, Milestone>,
}

impl Staged {
    fn get(&self, id: &str) -> Result<&Milestone> {
        self.milestones
            .get(id)
            .ok_or_else(|| GraphError::milestone_not_found(id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Milestone> {
        self.milestones
            .get_mut(id)
            .ok_or_else(|| GraphError::milestone_not_found(id))
    }

    fn resolve(&self, id: &str) -> Result<()> {
        if id == self.goal_id || self.milestones.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::milestone_not_found(id))
        }
    }

    fn ensure_unique_name(&self, name: &str, except: Option<&str>) -> Result<()> {
        let key = name_key(name);
        if key.is_empty() {
            return Err(GraphError::InvalidInput("milestone name is empty".into()));
        }
        let clash = self
            .milestones
            .values()
            .any(|m| Some(m.id.as_str()) != except && name_key(&m.name) == key);
        if clash {
            return Err(GraphError::DuplicateMilestoneName(name.trim().to_string()));
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        let mut n = self.milestones.len() + 1;
        loop {
            let id = milestone_id(&self.goal_id, n);
            if !self.milestones.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    fn fresh(&self, name: &str, score: u8) -> Result<Milestone> {
        validate_score(score)?;
        self.ensure_unique_name(name, None)?;
        Ok(Milestone::new(self.next_id(), name.trim(), score))
    }

    fn edge_from(&self, prerequisite_id: &str, edge: Option<EdgeSpec>) -> EdgeSpec {
        match edge {
            Some(edge) => edge,
            None if prerequisite_id == self.goal_id => EdgeSpec::goal_link(),
            None => EdgeSpec::default(),
        }
    }

    /// Remove `id`, handing its predecessors to every dependent.
    fn remove_with_reconnection(&mut self, id: &str) -> Result<Milestone> {
        let removed = self
            .milestones
            .remove(id)
            .ok_or_else(|| GraphError::milestone_not_found(id))?;

        let inherited: Vec<String> = if removed.predecessors.is_empty() {
            vec![self.goal_id.clone()]
        } else {
            removed.predecessors.clone()
        };

        let goal_id = self.goal_id.clone();
        for dependent in self.milestones.values_mut() {
            if !dependent.has_predecessor(id) {
                continue;
            }
            let old = dependent.unlink(id);
            for p in &inherited {
                if *p == dependent.id {
                    continue;
                }
                let edge = match (&old, p == &goal_id) {
                    (_, true) | (None, _) => EdgeSpec::goal_link(),
                    (Some(rel), false) => EdgeSpec::new(rel.relationship_type, rel.strength)
                        .with_confidence(rel.confidence),
                };
                dependent.link(p, edge);
            }
            debug!(
                milestone_id = %dependent.id,
                removed = %id,
                "Reconnected dependent"
            );
        }
        Ok(removed)
    }
}

/// Verify the predecessors/relationship invariant over a milestone map.
fn check_milestones(goal_id: &str, milestones: &BTreeMap<String, Milestone>) -> Result<()> {
    let mut names = BTreeSet::new();
    for (key, m) in milestones {
        let fail = |what: String| Err(GraphError::InvariantViolation(format!("{}: {}", m.id, what)));
        if *key != m.id {
            return fail(format!("stored under key '{}'", key));
        }
        if !names.insert(name_key(&m.name)) {
            return fail(format!("duplicate name '{}'", m.name));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&m.score) {
            return fail(format!("score {} out of range", m.score));
        }

        let preds: BTreeSet<&str> = m.predecessors.iter().map(String::as_str).collect();
        if preds.len() != m.predecessors.len() {
            return fail("duplicate predecessor".into());
        }
        if preds.contains(m.id.as_str()) {
            return fail("depends on itself".into());
        }
        if let Some(dangling) = preds
            .iter()
            .find(|p| **p != goal_id && !milestones.contains_key(**p))
        {
            return fail(format!("unknown predecessor '{}'", dangling));
        }

        let mut rel_preds = BTreeSet::new();
        for rel in &m.causal_relationships {
            if rel.dependent_id != m.id {
                return fail(format!("holds relationship for '{}'", rel.dependent_id));
            }
            if !rel_preds.insert(rel.prerequisite_id.as_str()) {
                return fail(format!("duplicate relationship from '{}'", rel.prerequisite_id));
            }
        }
        if preds != rel_preds {
            return fail("predecessors and causal relationships disagree".into());
        }

        let mut voters = BTreeSet::new();
        for vote in &m.votes {
            if !voters.insert(vote.voter_id.as_str()) {
                return fail(format!("voter '{}' voted twice", vote.voter_id));
            }
        }
    }
    Ok(())
}

impl Goal {
    /// Check the predecessors/relationship invariant for every milestone.
    pub fn check_invariants(&self) -> Result<()> {
        check_milestones(&self.id, &self.milestones)
    }

    /// Stage a mutation, verify the result and commit it atomically.
    fn transact<T>(&mut self, op: &str, f: impl FnOnce(&mut Staged) -> Result<T>) -> Result<T> {
        let mut staged = Staged {
            goal_id: self.id.clone(),
            milestones: self.milestones.clone(),
        };
        let out = match f(&mut staged) {
            Ok(out) => out,
            Err(e) => {
                debug!(goal_id = %self.id, op = op, error = %e, "Mutation rejected");
                return Err(e);
            }
        };
        check_milestones(&self.id, &staged.milestones)?;
        self.milestones = staged.milestones;
        self.generation += 1;
        Ok(out)
    }

    /// Add a milestone under `parent` (the goal when `None`).
    pub fn add_milestone(
        &mut self,
        name: &str,
        score: u8,
        parent: Option<&str>,
        edge: Option<EdgeSpec>,
    ) -> Result<String> {
        let id = self.transact("add_milestone", |s| {
            let parent = parent.unwrap_or(&s.goal_id).to_string();
            s.resolve(&parent)?;
            let mut milestone = s.fresh(name, score)?;
            milestone.link(&parent, s.edge_from(&parent, edge));
            let id = milestone.id.clone();
            s.milestones.insert(id.clone(), milestone);
            Ok(id)
        })?;
        info!(goal_id = %self.id, milestone_id = %id, name = %name.trim(), "Added milestone");
        Ok(id)
    }

    /// Add a milestone that depends on `target`.
    pub fn insert_after(&mut self, target: &str, name: &str, score: u8) -> Result<String> {
        self.add_milestone(name, score, Some(target), None)
    }

    /// Add a milestone between `target` and its current predecessors.
    pub fn insert_before(&mut self, target: &str, name: &str, score: u8) -> Result<String> {
        let id = self.transact("insert_before", |s| {
            let mut milestone = s.fresh(name, score)?;
            let id = milestone.id.clone();
            let target_ms = s.get_mut(target)?;

            milestone.predecessors = std::mem::take(&mut target_ms.predecessors);
            milestone.causal_relationships = std::mem::take(&mut target_ms.causal_relationships)
                .into_iter()
                .map(|mut rel| {
                    rel.dependent_id = id.clone();
                    rel
                })
                .collect();
            target_ms.link(&id, EdgeSpec::default());

            s.milestones.insert(id.clone(), milestone);
            Ok(id)
        })?;
        info!(goal_id = %self.id, milestone_id = %id, before = %target, "Inserted milestone");
        Ok(id)
    }

    /// Add a new prerequisite of `enabled_id`, in parallel with its existing ones.
    ///
    /// The new milestone has no predecessors of its own (implicitly wired to
    /// the goal); it never chains through the prerequisites already present.
    pub fn insert_as_prerequisite(
        &mut self,
        enabled_id: &str,
        name: &str,
        score: u8,
        edge: Option<EdgeSpec>,
    ) -> Result<String> {
        if enabled_id == self.id {
            return self.add_milestone(name, score, None, None);
        }
        let id = self.transact("insert_as_prerequisite", |s| {
            s.get(enabled_id)?;
            let milestone = s.fresh(name, score)?;
            let id = milestone.id.clone();
            s.milestones.insert(id.clone(), milestone);
            s.get_mut(enabled_id)?
                .link(&id, edge.unwrap_or_default());
            Ok(id)
        })?;
        info!(
            goal_id = %self.id,
            milestone_id = %id,
            enables = %enabled_id,
            "Inserted prerequisite"
        );
        Ok(id)
    }

    /// Make an existing milestone (or the goal) a predecessor of `dependent_id`.
    pub fn connect_milestones(
        &mut self,
        prerequisite_id: &str,
        dependent_id: &str,
        edge: Option<EdgeSpec>,
    ) -> Result<()> {
        self.transact("connect_milestones", |s| {
            s.resolve(prerequisite_id)?;
            if prerequisite_id == dependent_id {
                return Err(GraphError::InvalidInput(format!(
                    "milestone '{}' cannot depend on itself",
                    dependent_id
                )));
            }
            let edge = s.edge_from(prerequisite_id, edge);
            let dependent = s.get_mut(dependent_id)?;
            if dependent.has_predecessor(prerequisite_id) {
                return Err(GraphError::InvalidInput(format!(
                    "'{}' already depends on '{}'",
                    dependent_id, prerequisite_id
                )));
            }
            dependent.link(prerequisite_id, edge);
            Ok(())
        })?;
        info!(
            goal_id = %self.id,
            prerequisite = %prerequisite_id,
            dependent = %dependent_id,
            "Connected milestones"
        );
        Ok(())
    }

    /// Drop one edge; a milestone left without predecessors falls back to the goal.
    ///
    /// Dropping the goal link itself may leave the milestone unlinked.
    pub fn disconnect_milestones(&mut self, prerequisite_id: &str, dependent_id: &str) -> Result<()> {
        let fell_back = self.transact("disconnect_milestones", |s| {
            let goal_id = s.goal_id.clone();
            let dependent = s.get_mut(dependent_id)?;
            dependent.unlink(prerequisite_id).ok_or_else(|| {
                GraphError::NotFound(format!(
                    "edge '{}' -> '{}'",
                    prerequisite_id, dependent_id
                ))
            })?;
            if dependent.predecessors.is_empty() && prerequisite_id != goal_id {
                dependent.link(&goal_id, EdgeSpec::goal_link());
                return Ok(true);
            }
            Ok(false)
        })?;
        info!(
            goal_id = %self.id,
            prerequisite = %prerequisite_id,
            dependent = %dependent_id,
            fell_back_to_goal = fell_back,
            "Disconnected milestones"
        );
        Ok(())
    }

    /// Remove a milestone, reconnecting its dependents to its predecessors.
    pub fn remove_milestone(&mut self, id: &str) -> Result<Milestone> {
        let removed = self.transact("remove_milestone", |s| {
            s.get(id)?;
            if s.milestones.len() <= 1 {
                return Err(GraphError::MinimumMilestonesViolation(s.goal_id.clone()));
            }
            s.remove_with_reconnection(id)
        })?;
        info!(goal_id = %self.id, milestone_id = %id, "Removed milestone");
        Ok(removed)
    }

    /// Remove several milestones at once; all must exist and one must remain.
    pub fn remove_milestone_group(&mut self, ids: &[String]) -> Result<Vec<Milestone>> {
        let removed = self.transact("remove_milestone_group", |s| {
            let unique: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            for id in &unique {
                s.get(id)?;
            }
            if unique.len() >= s.milestones.len() {
                return Err(GraphError::MinimumMilestonesViolation(s.goal_id.clone()));
            }
            unique
                .into_iter()
                .map(|id| s.remove_with_reconnection(id))
                .collect::<Result<Vec<_>>>()
        })?;
        info!(goal_id = %self.id, count = removed.len(), "Removed milestone group");
        Ok(removed)
    }

    pub fn update_milestone_score(&mut self, id: &str, score: u8) -> Result<()> {
        self.transact("update_milestone_score", |s| {
            validate_score(score)?;
            s.get_mut(id)?.score = score;
            Ok(())
        })?;
        debug!(goal_id = %self.id, milestone_id = %id, score = score, "Updated score");
        Ok(())
    }

    pub fn rename_milestone(&mut self, id: &str, name: &str) -> Result<()> {
        self.transact("rename_milestone", |s| {
            s.get(id)?;
            s.ensure_unique_name(name, Some(id))?;
            s.get_mut(id)?.name = name.trim().to_string();
            Ok(())
        })?;
        info!(goal_id = %self.id, milestone_id = %id, name = %name.trim(), "Renamed milestone");
        Ok(())
    }

    /// Record a vote; one vote per voter per milestone.
    pub fn record_vote(&mut self, id: &str, voter_id: &str, up: bool, weight: f64) -> Result<()> {
        self.transact("record_vote", |s| {
            if !weight.is_finite() || weight < 0.0 {
                return Err(GraphError::InvalidInput(format!("vote weight {}", weight)));
            }
            let milestone = s.get_mut(id)?;
            if milestone.vote_by(voter_id).is_some() {
                return Err(GraphError::AlreadyVoted {
                    voter_id: voter_id.to_string(),
                    milestone_id: id.to_string(),
                });
            }
            milestone.votes.push(Vote {
                voter_id: voter_id.to_string(),
                up,
                weight,
                timestamp: Utc::now(),
            });
            Ok(())
        })?;
        info!(goal_id = %self.id, milestone_id = %id, voter = %voter_id, up = up, "Recorded vote");
        Ok(())
    }

    /// Remove a voter's vote so they may vote again.
    pub fn clear_vote(&mut self, id: &str, voter_id: &str) -> Result<Vote> {
        let vote = self.transact("clear_vote", |s| {
            let milestone = s.get_mut(id)?;
            let pos = milestone
                .votes
                .iter()
                .position(|v| v.voter_id == voter_id)
                .ok_or_else(|| GraphError::NotFound(format!("vote by '{}' on '{}'", voter_id, id)))?;
            Ok(milestone.votes.remove(pos))
        })?;
        info!(goal_id = %self.id, milestone_id = %id, voter = %voter_id, "Cleared vote");
        Ok(vote)
    }

    pub fn vote_summary(&self, id: &str) -> Result<VoteSummary> {
        self.milestone(id)
            .map(Milestone::vote_summary)
            .ok_or_else(|| GraphError::milestone_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationshipType;

    fn goal_with(names: &[&str]) -> (Goal, Vec<String>) {
        let mut goal = Goal::new("g1", "Become a staff engineer");
        let ids = names
            .iter()
            .map(|n| goal.add_milestone(n, 5, None, None).unwrap())
            .collect();
        (goal, ids)
    }

    #[test]
    fn test_add_milestone_wires_goal() {
        let (goal, ids) = goal_with(&["Learn Rust"]);
        let m = goal.milestone(&ids[0]).unwrap();
        assert_eq!(m.predecessors, vec!["g1".to_string()]);
        assert_eq!(m.causal_relationships[0].prerequisite_id, "g1");
        assert!(m.id.starts_with("ms_g1_1_"));
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut goal, _) = goal_with(&["Learn Rust"]);
        let generation = goal.generation();
        let err = goal.add_milestone("  learn rust ", 5, None, None).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateMilestoneName(_)));
        assert_eq!(goal.len(), 1);
        assert_eq!(goal.generation(), generation);
    }

    #[test]
    fn test_unknown_parent_is_not_found() {
        let (mut goal, _) = goal_with(&["Learn Rust"]);
        let err = goal.add_milestone("Ship it", 5, Some("nope"), None).unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }

    #[test]
    fn test_score_range() {
        let (mut goal, ids) = goal_with(&["Learn Rust"]);
        assert!(matches!(
            goal.add_milestone("Other", 11, None, None),
            Err(GraphError::InvalidInput(_))
        ));
        assert!(goal.update_milestone_score(&ids[0], 0).is_err());
        goal.update_milestone_score(&ids[0], 9).unwrap();
        assert_eq!(goal.milestone(&ids[0]).unwrap().score, 9);
    }

    #[test]
    fn test_insert_after_and_before() {
        let (mut goal, ids) = goal_with(&["A"]);
        let c = goal.insert_after(&ids[0], "C", 5).unwrap();
        let b = goal.insert_before(&c, "B", 5).unwrap();

        let b_ms = goal.milestone(&b).unwrap();
        assert_eq!(b_ms.predecessors, vec![ids[0].clone()]);
        assert_eq!(b_ms.causal_relationships[0].dependent_id, b);
        assert_eq!(goal.milestone(&c).unwrap().predecessors, vec![b.clone()]);
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_as_prerequisite_is_parallel() {
        let (mut goal, ids) = goal_with(&["Senior role"]);
        let target = ids[0].clone();
        let p1 = goal.insert_as_prerequisite(&target, "System design", 6, None).unwrap();
        let p2 = goal.insert_as_prerequisite(&target, "Mentoring", 6, None).unwrap();

        let t = goal.milestone(&target).unwrap();
        assert!(t.has_predecessor(&p1));
        assert!(t.has_predecessor(&p2));
        assert!(!goal.milestone(&p1).unwrap().has_predecessor(&p2));
        assert!(!goal.milestone(&p2).unwrap().has_predecessor(&p1));
        assert_eq!(
            t.relationship_from(&p1).unwrap().relationship_type,
            RelationshipType::Prerequisite
        );
        assert_eq!(t.relationship_from(&p1).unwrap().strength, 0.8);
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_as_prerequisite_of_goal() {
        let (mut goal, _) = goal_with(&["A"]);
        let id = goal.insert_as_prerequisite("g1", "B", 5, None).unwrap();
        assert_eq!(goal.milestone(&id).unwrap().predecessors, vec!["g1".to_string()]);
    }

    #[test]
    fn test_remove_reconnects_dependents() {
        let (mut goal, ids) = goal_with(&["A", "B"]);
        let x = goal.add_milestone("X", 5, Some(&ids[0]), None).unwrap();
        goal.connect_milestones(&ids[1], &x, None).unwrap();
        let d1 = goal.add_milestone("D1", 5, Some(&x), None).unwrap();
        let d2 = goal.add_milestone("D2", 5, Some(&x), None).unwrap();
        goal.connect_milestones(&ids[0], &d2, None).unwrap();

        goal.remove_milestone(&x).unwrap();

        for d in [&d1, &d2] {
            let m = goal.milestone(d).unwrap();
            assert!(!m.has_predecessor(&x));
            assert!(m.has_predecessor(&ids[0]));
            assert!(m.has_predecessor(&ids[1]));
        }
        assert_eq!(goal.milestone(&d2).unwrap().predecessors.len(), 2);
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_without_predecessors_reconnects_to_goal() {
        let (mut goal, ids) = goal_with(&["Target"]);
        let p = goal.insert_as_prerequisite(&ids[0], "Prereq", 5, None).unwrap();
        let dependent_before = goal.milestone(&ids[0]).unwrap().predecessors.clone();
        assert!(dependent_before.contains(&p));

        goal.remove_milestone(&p).unwrap();
        let t = goal.milestone(&ids[0]).unwrap();
        assert_eq!(t.predecessors, vec!["g1".to_string()]);
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_minimum_milestone_guard() {
        let (mut goal, ids) = goal_with(&["Only"]);
        let before = goal.clone();
        let err = goal.remove_milestone(&ids[0]).unwrap_err();
        assert!(matches!(err, GraphError::MinimumMilestonesViolation(_)));
        assert_eq!(goal.milestones, before.milestones);
        assert_eq!(goal.generation(), before.generation());
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let (mut goal, _) = goal_with(&["A", "B"]);
        assert!(matches!(goal.remove_milestone("missing"), Err(GraphError::NotFound(_))));
    }

    #[test]
    fn test_remove_group_keeps_one() {
        let (mut goal, ids) = goal_with(&["A", "B", "C"]);
        assert!(matches!(
            goal.remove_milestone_group(&ids),
            Err(GraphError::MinimumMilestonesViolation(_))
        ));
        assert!(matches!(
            goal.remove_milestone_group(&[ids[0].clone(), "missing".to_string()]),
            Err(GraphError::NotFound(_))
        ));
        assert_eq!(goal.len(), 3);

        let removed = goal.remove_milestone_group(&ids[..2]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(goal.len(), 1);
    }

    #[test]
    fn test_vote_uniqueness_and_clear() {
        let (mut goal, ids) = goal_with(&["A"]);
        goal.record_vote(&ids[0], "u1", true, 1.0).unwrap();
        let err = goal.record_vote(&ids[0], "u1", false, 1.0).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyVoted { .. }));
        assert_eq!(goal.vote_summary(&ids[0]).unwrap().upvotes, 1);

        goal.clear_vote(&ids[0], "u1").unwrap();
        goal.record_vote(&ids[0], "u1", false, 1.0).unwrap();
        let summary = goal.vote_summary(&ids[0]).unwrap();
        assert_eq!(summary.downvotes, 1);
        assert_eq!(summary.score, -1);
        assert!(goal.clear_vote(&ids[0], "u2").is_err());
        assert!(goal.record_vote(&ids[0], "u3", true, -1.0).is_err());
    }

    #[test]
    fn test_connect_rejects_self_and_duplicate() {
        let (mut goal, ids) = goal_with(&["A", "B"]);
        assert!(goal.connect_milestones(&ids[0], &ids[0], None).is_err());
        goal.connect_milestones(&ids[0], &ids[1], None).unwrap();
        assert!(goal.connect_milestones(&ids[0], &ids[1], None).is_err());
        goal.disconnect_milestones(&ids[0], &ids[1]).unwrap();
        assert!(goal.disconnect_milestones(&ids[0], &ids[1]).is_err());
    }

    #[test]
    fn test_disconnect_falls_back_to_goal() {
        let (mut goal, ids) = goal_with(&["A", "B"]);
        let goal_id = goal.id.clone();
        goal.connect_milestones(&ids[0], &ids[1], None).unwrap();
        goal.disconnect_milestones(&goal_id, &ids[1]).unwrap();
        assert_eq!(goal.milestone(&ids[1]).unwrap().predecessors, vec![ids[0].clone()]);

        goal.disconnect_milestones(&ids[0], &ids[1]).unwrap();
        let b = goal.milestone(&ids[1]).unwrap();
        assert_eq!(b.predecessors, vec![goal_id.clone()]);
        assert!(b.relationship_from(&goal_id).is_some());
        goal.check_invariants().unwrap();

        // The goal link itself can be dropped.
        goal.disconnect_milestones(&goal_id, &ids[1]).unwrap();
        assert!(goal.milestone(&ids[1]).unwrap().predecessors.is_empty());
        goal.check_invariants().unwrap();
    }

    #[test]
    fn test_rename() {
        let (mut goal, ids) = goal_with(&["A", "B"]);
        assert!(matches!(
            goal.rename_milestone(&ids[1], "a"),
            Err(GraphError::DuplicateMilestoneName(_))
        ));
        goal.rename_milestone(&ids[0], "a ").unwrap();
        assert_eq!(goal.milestone(&ids[0]).unwrap().name, "a");
    }

    #[test]
    fn test_invariant_holds_after_mixed_operations() {
        let (mut goal, ids) = goal_with(&["A", "B", "C"]);
        let d = goal.insert_after(&ids[0], "D", 4).unwrap();
        let e = goal.insert_before(&d, "E", 4).unwrap();
        let f = goal.insert_as_prerequisite(&e, "F", 4, None).unwrap();
        goal.connect_milestones(&ids[2], &f, None).unwrap();
        goal.remove_milestone(&e).unwrap();
        goal.remove_milestone(&ids[2]).unwrap();
        goal.insert_as_prerequisite(&d, "G", 4, None).unwrap();
        goal.remove_milestone_group(&[ids[1].clone()]).unwrap();
        goal.check_invariants().unwrap();

        for m in goal.milestones.values() {
            for p in &m.predecessors {
                assert!(m.relationship_from(p).is_some());
            }
            for r in &m.causal_relationships {
                assert!(m.has_predecessor(&r.prerequisite_id));
            }
        }
    }

    #[test]
    fn test_invariant_violation_detected() {
        let (mut goal, ids) = goal_with(&["A"]);
        if let Some(m) = goal.milestones.get_mut(&ids[0]) {
            m.causal_relationships.clear();
        }
        assert!(matches!(
            goal.check_invariants(),
            Err(GraphError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_person_goal_ordering() {
        let mut store = GraphStore::new();
        let person = store.person_mut("alice");
        let first = person.create_goal("First");
        let last = person.insert_goal_at_end("Last");
        let start = person.insert_goal_at_beginning("Start");
        let middle = person.insert_goal_between(&first, &last, "Middle").unwrap();
        assert_eq!(person.goal_ids(), &[start.clone(), first.clone(), middle, last.clone()]);
        assert!(person.insert_goal_between(&last, &first, "Nope").is_err());

        person.remove_goal(&start).unwrap();
        assert!(matches!(person.remove_goal(&start), Err(GraphError::NotFound(_))));
        assert_eq!(store.person("alice").unwrap().goals.len(), 3);
        assert!(store.goal("alice", &first).is_ok());
        assert!(store.goal("bob", &first).is_err());
    }
}
