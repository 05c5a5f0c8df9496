//! Consistency checks over typed causal relationships.
//!
//! Four independent checks run over every milestone-to-milestone
//! relationship in a goal. Goal wiring is structural and is not checked.
//! Findings accumulate; no check stops the others.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::structure::Severity;
use crate::types::{CausalRelationship, Goal, RelationshipType};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Tables and thresholds driving the checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyRules {
    /// Max allowed spread of incoming strengths
    pub strength_variation_threshold: f64,
    /// Type pairs that contradict when asserted in opposite directions
    pub contradictory_pairs: Vec<(RelationshipType, RelationshipType)>,
    /// Type pairs that conflict when both point into the same milestone
    pub problematic_combinations: Vec<(RelationshipType, RelationshipType)>,
}

impl Default for ConsistencyRules {
    fn default() -> Self {
        use RelationshipType::*;
        Self {
            strength_variation_threshold: 0.7,
            contradictory_pairs: vec![
                (Enables, Inhibitory),
                (Supports, Inhibitory),
                (DirectCause, Inhibitory),
                (Prerequisite, Inhibitory),
            ],
            problematic_combinations: vec![
                (DirectCause, Inhibitory),
                (Prerequisite, Inhibitory),
                (Enables, Inhibitory),
            ],
        }
    }
}

impl ConsistencyRules {
    /// Whether two types contradict, in either order.
    pub fn are_contradictory(&self, a: RelationshipType, b: RelationshipType) -> bool {
        self.contradictory_pairs
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    ContradictoryRelationships,
    StrengthVariation,
    ConflictingRelationshipTypes,
    TemporalParadox,
}

impl InconsistencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContradictoryRelationships => "contradictory_relationships",
            Self::StrengthVariation => "strength_variation",
            Self::ConflictingRelationshipTypes => "conflicting_relationship_types",
            Self::TemporalParadox => "temporal_paradox",
        }
    }
}

/// Check-specific evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum InconsistencyDetails {
    Contradiction {
        forward_type: RelationshipType,
        reverse_type: RelationshipType,
    },
    Strengths {
        strengths: Vec<f64>,
        variation: f64,
    },
    Types {
        conflicting_types: (RelationshipType, RelationshipType),
    },
    Temporal {
        return_path: Vec<String>,
    },
}

/// One finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Inconsistency {
    pub kind: InconsistencyKind,
    pub severity: Severity,
    pub description: String,
    /// Milestone ids involved
    pub elements: Vec<String>,
    pub details: InconsistencyDetails,
}

/// Runs the four relationship checks over a goal.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyChecker {
    rules: ConsistencyRules,
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: ConsistencyRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ConsistencyRules {
        &self.rules
    }

    /// Run every check and return all findings.
    pub fn check(&self, goal: &Goal) -> Vec<Inconsistency> {
        let relations: Vec<&CausalRelationship> = goal.causal_relationships().collect();

        let mut findings = Vec::new();
        findings.extend(self.check_contradictions(&relations));
        findings.extend(self.check_strength_variation(&relations));
        findings.extend(self.check_type_conflicts(&relations));
        findings.extend(self.check_temporal_paradoxes(&relations));

        debug!(
            goal_id = %goal.id,
            relationships = relations.len(),
            findings = findings.len(),
            "Consistency check completed"
        );
        findings
    }

    /// Opposite-direction edges whose types contradict, once per pair.
    pub fn check_contradictions(&self, relations: &[&CausalRelationship]) -> Vec<Inconsistency> {
        let by_pair: BTreeMap<(&str, &str), &CausalRelationship> = relations
            .iter()
            .map(|r| ((r.prerequisite_id.as_str(), r.dependent_id.as_str()), *r))
            .collect();

        by_pair
            .iter()
            .filter(|((a, b), _)| a < b)
            .filter_map(|(&(a, b), forward)| {
                let reverse = by_pair.get(&(b, a))?;
                self.rules
                    .are_contradictory(forward.relationship_type, reverse.relationship_type)
                    .then(|| Inconsistency {
                        kind: InconsistencyKind::ContradictoryRelationships,
                        severity: Severity::High,
                        description: format!("Contradictory relationship types between {} and {}", a, b),
                        elements: vec![a.to_string(), b.to_string()],
                        details: InconsistencyDetails::Contradiction {
                            forward_type: forward.relationship_type,
                            reverse_type: reverse.relationship_type,
                        },
                    })
            })
            .collect()
    }

    pub fn check_strength_variation(&self, relations: &[&CausalRelationship]) -> Vec<Inconsistency> {
        incoming(relations)
            .into_iter()
            .filter(|(_, rels)| rels.len() >= 2)
            .filter_map(|(node, rels)| {
                let strengths: Vec<f64> = rels.iter().map(|r| r.strength).collect();
                let max = strengths.iter().copied().fold(f64::MIN, f64::max);
                let min = strengths.iter().copied().fold(f64::MAX, f64::min);
                let variation = max - min;
                (variation > self.rules.strength_variation_threshold).then(|| Inconsistency {
                    kind: InconsistencyKind::StrengthVariation,
                    severity: Severity::Medium,
                    description: format!("Large variation in relationship strengths for {}", node),
                    elements: vec![node.to_string()],
                    details: InconsistencyDetails::Strengths {
                        strengths,
                        variation,
                    },
                })
            })
            .collect()
    }

    pub fn check_type_conflicts(&self, relations: &[&CausalRelationship]) -> Vec<Inconsistency> {
        let mut findings = Vec::new();
        for (node, rels) in incoming(relations) {
            let types: BTreeSet<RelationshipType> = rels.iter().map(|r| r.relationship_type).collect();
            for &(a, b) in &self.rules.problematic_combinations {
                if types.contains(&a) && types.contains(&b) {
                    findings.push(Inconsistency {
                        kind: InconsistencyKind::ConflictingRelationshipTypes,
                        severity: Severity::Medium,
                        description: format!("Conflicting relationship types for {}: {} and {}", node, a, b),
                        elements: vec![node.to_string()],
                        details: InconsistencyDetails::Types {
                            conflicting_types: (a, b),
                        },
                    });
                }
            }
        }
        findings
    }

    /// A temporal edge s -> t while t already reaches s.
    pub fn check_temporal_paradoxes(&self, relations: &[&CausalRelationship]) -> Vec<Inconsistency> {
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for r in relations {
            adjacency
                .entry(r.prerequisite_id.as_str())
                .or_default()
                .push(r.dependent_id.as_str());
        }

        relations
            .iter()
            .filter(|r| r.relationship_type == RelationshipType::Temporal)
            .filter_map(|r| {
                let source = r.prerequisite_id.as_str();
                let target = r.dependent_id.as_str();
                let return_path = find_path(&adjacency, target, source)?;
                Some(Inconsistency {
                    kind: InconsistencyKind::TemporalParadox,
                    severity: Severity::High,
                    description: format!(
                        "Temporal relationship creates circular dependency: {} -> {}",
                        source, target
                    ),
                    elements: vec![source.to_string(), target.to_string()],
                    details: InconsistencyDetails::Temporal { return_path },
                })
            })
            .collect()
    }
}

/// Relationships grouped by dependent.
fn incoming<'a>(relations: &[&'a CausalRelationship]) -> BTreeMap<&'a str, Vec<&'a CausalRelationship>> {
    let mut map: BTreeMap<&str, Vec<&CausalRelationship>> = BTreeMap::new();
    for r in relations {
        map.entry(r.dependent_id.as_str()).or_default().push(*r);
    }
    map
}

/// Shortest path `from` -> `to` by BFS.
fn find_path(adjacency: &BTreeMap<&str, Vec<&str>>, from: &str, to: &str) -> Option<Vec<String>> {
    let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
    let mut seen = BTreeSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(u) = queue.pop_front() {
        if u == to {
            let mut path = vec![to.to_string()];
            let mut cur = to;
            while let Some(&p) = parent.get(cur) {
                path.push(p.to_string());
                cur = p;
            }
            path.reverse();
            return Some(path);
        }
        for &v in adjacency.get(u).into_iter().flatten() {
            if seen.insert(v) {
                parent.insert(v, u);
                queue.push_back(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeSpec;

    fn two_milestones() -> (Goal, String, String) {
        let mut goal = Goal::new("g", "Goal");
        let a = goal.add_milestone("A", 5, None, None).unwrap();
        let b = goal.add_milestone("B", 5, None, None).unwrap();
        (goal, a, b)
    }

    #[test]
    fn test_contradiction_reported_once() {
        let (mut goal, a, b) = two_milestones();
        goal.connect_milestones(&a, &b, Some(EdgeSpec::new(RelationshipType::Enables, 0.8)))
            .unwrap();
        goal.connect_milestones(&b, &a, Some(EdgeSpec::new(RelationshipType::Inhibitory, 0.8)))
            .unwrap();

        let findings = ConsistencyChecker::new().check(&goal);
        let contradictions: Vec<_> = findings
            .iter()
            .filter(|f| f.kind == InconsistencyKind::ContradictoryRelationships)
            .collect();
        assert_eq!(contradictions.len(), 1);
        assert_eq!(contradictions[0].severity, Severity::High);
    }

    #[test]
    fn test_mutual_support_is_not_contradictory() {
        let (mut goal, a, b) = two_milestones();
        let edge = Some(EdgeSpec::new(RelationshipType::MutualReinforcement, 0.6));
        goal.connect_milestones(&a, &b, edge).unwrap();
        goal.connect_milestones(&b, &a, edge).unwrap();
        assert!(ConsistencyChecker::new().check(&goal).is_empty());
    }

    #[test]
    fn test_strength_variation() {
        let (mut goal, a, b) = two_milestones();
        let c = goal
            .add_milestone("C", 5, Some(&a), Some(EdgeSpec::new(RelationshipType::Supports, 0.95)))
            .unwrap();
        goal.connect_milestones(&b, &c, Some(EdgeSpec::new(RelationshipType::Supports, 0.1)))
            .unwrap();

        let findings = ConsistencyChecker::new().check(&goal);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, InconsistencyKind::StrengthVariation);
        assert_eq!(findings[0].elements, vec![c]);
    }

    #[test]
    fn test_goal_wiring_ignored_for_strength() {
        let (mut goal, a, _) = two_milestones();
        // A's goal edge (strength 1.0) must not count against the 0.1 prerequisite
        goal.insert_as_prerequisite(&a, "P", 5, Some(EdgeSpec::new(RelationshipType::Prerequisite, 0.1)))
            .unwrap();
        assert!(ConsistencyChecker::new().check(&goal).is_empty());
    }

    #[test]
    fn test_type_conflict_and_checks_accumulate() {
        let (mut goal, a, b) = two_milestones();
        let c = goal
            .add_milestone("C", 5, Some(&a), Some(EdgeSpec::new(RelationshipType::Prerequisite, 0.9)))
            .unwrap();
        goal.connect_milestones(&b, &c, Some(EdgeSpec::new(RelationshipType::Inhibitory, 0.1)))
            .unwrap();

        let findings = ConsistencyChecker::new().check(&goal);
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&InconsistencyKind::StrengthVariation));
        assert!(kinds.contains(&InconsistencyKind::ConflictingRelationshipTypes));
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_temporal_paradox() {
        let (mut goal, a, b) = two_milestones();
        let c = goal.add_milestone("C", 5, Some(&b), None).unwrap();
        goal.connect_milestones(&a, &b, None).unwrap();
        goal.connect_milestones(&c, &a, Some(EdgeSpec::new(RelationshipType::Temporal, 0.7)))
            .unwrap();

        let findings = ConsistencyChecker::new().check(&goal);
        let paradox = findings
            .iter()
            .find(|f| f.kind == InconsistencyKind::TemporalParadox)
            .unwrap();
        assert_eq!(paradox.elements, vec![c.clone(), a.clone()]);
        match &paradox.details {
            InconsistencyDetails::Temporal { return_path } => {
                assert_eq!(return_path, &vec![a, b, c]);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }
}
