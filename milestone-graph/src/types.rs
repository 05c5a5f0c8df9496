//! Core types for the milestone graph.
//!
//! A [`Person`] owns goals, a [`Goal`] owns its milestones keyed by id, and
//! every [`Milestone`] carries both its `predecessors` list and the
//! [`CausalRelationship`] records backing each entry of that list.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for the dashboard that renders roadmaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Lowest importance score a milestone may carry.
pub const MIN_SCORE: u8 = 1;
/// Highest importance score a milestone may carry.
pub const MAX_SCORE: u8 = 10;
/// Score assigned when a caller does not supply one.
pub const DEFAULT_SCORE: u8 = 5;

/// Kind of causal claim an edge makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    DirectCause,
    IndirectCause,
    Prerequisite,
    Enables,
    Supports,
    MutualReinforcement,
    Inhibitory,
    Conditional,
    Temporal,
}

impl RelationshipType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectCause => "direct_cause",
            Self::IndirectCause => "indirect_cause",
            Self::Prerequisite => "prerequisite",
            Self::Enables => "enables",
            Self::Supports => "supports",
            Self::MutualReinforcement => "mutual_reinforcement",
            Self::Inhibitory => "inhibitory",
            Self::Conditional => "conditional",
            Self::Temporal => "temporal",
        }
    }

    /// Every relationship type, in declaration order.
    pub fn all() -> [Self; 9] {
        [
            Self::DirectCause,
            Self::IndirectCause,
            Self::Prerequisite,
            Self::Enables,
            Self::Supports,
            Self::MutualReinforcement,
            Self::Inhibitory,
            Self::Conditional,
            Self::Temporal,
        ]
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, weighted edge: `prerequisite_id` causally enables `dependent_id`.
///
/// Records are stored on the dependent milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CausalRelationship {
    /// Milestone or goal id this edge starts from
    pub prerequisite_id: String,
    /// Milestone the edge points at
    pub dependent_id: String,
    /// What kind of causal claim this is
    pub relationship_type: RelationshipType,
    /// Strength of the claim (0.0 - 1.0)
    pub strength: f64,
    /// Confidence in the claim (0.0 - 1.0)
    pub confidence: f64,
    /// Whether the claim also holds in reverse
    #[serde(default)]
    pub bidirectional: bool,
}

/// Shape of a new edge, used by the store when wiring milestones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSpec {
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub confidence: f64,
}

impl EdgeSpec {
    pub fn new(relationship_type: RelationshipType, strength: f64) -> Self {
        Self {
            relationship_type,
            strength,
            confidence: strength,
        }
    }

    /// Set confidence independently of strength.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Edge from the goal to a milestone it directly enables.
    pub fn goal_link() -> Self {
        Self::new(RelationshipType::Enables, 1.0)
    }

    pub(crate) fn relationship(&self, prerequisite_id: &str, dependent_id: &str) -> CausalRelationship {
        CausalRelationship {
            prerequisite_id: prerequisite_id.to_string(),
            dependent_id: dependent_id.to_string(),
            relationship_type: self.relationship_type,
            strength: self.strength.clamp(0.0, 1.0),
            confidence: self.confidence.clamp(0.0, 1.0),
            bidirectional: false,
        }
    }
}

impl Default for EdgeSpec {
    /// Milestone-to-milestone prerequisite.
    fn default() -> Self {
        Self::new(RelationshipType::Prerequisite, 0.8)
    }
}

/// A single approval or rejection of a milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Vote {
    /// Who voted; empty on legacy votes until loading assigns one
    #[serde(default, alias = "user_id")]
    pub voter_id: String,
    /// Thumbs up (true) or thumbs down (false)
    #[serde(alias = "vote")]
    pub up: bool,
    /// Voting weight (>= 0)
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// When the vote was cast
    #[serde(deserialize_with = "lenient_time::deserialize")]
    pub timestamp: DateTime<Utc>,
}

fn default_weight() -> f64 {
    1.0
}

/// Timestamp parsing that accepts RFC 3339 and naive ISO 8601.
///
/// Naive values carry no offset and are read as UTC.
pub mod lenient_time {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("unrecognized timestamp '{raw}'")))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp '{raw}'"))),
            None => Ok(None),
        }
    }
}

/// A step toward a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Milestone {
    /// Unique within the owning goal
    pub id: String,
    /// Display name, unique within the goal (case-insensitive, trimmed)
    pub name: String,
    /// Importance (1-10)
    pub score: u8,
    /// Milestone or goal ids this milestone depends on
    pub predecessors: Vec<String>,
    /// One record per predecessor, stored on this (dependent) side
    pub causal_relationships: Vec<CausalRelationship>,
    /// At most one vote per voter
    pub votes: Vec<Vote>,
    /// Creation time, used for stable ordering
    #[serde(deserialize_with = "lenient_time::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl Milestone {
    pub fn new(id: impl Into<String>, name: impl Into<String>, score: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            score,
            predecessors: Vec::new(),
            causal_relationships: Vec::new(),
            votes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_predecessor(&self, id: &str) -> bool {
        self.predecessors.iter().any(|p| p == id)
    }

    /// The relationship backing the predecessor `prerequisite_id`, if any.
    pub fn relationship_from(&self, prerequisite_id: &str) -> Option<&CausalRelationship> {
        self.causal_relationships
            .iter()
            .find(|r| r.prerequisite_id == prerequisite_id)
    }

    pub fn vote_by(&self, voter_id: &str) -> Option<&Vote> {
        self.votes.iter().find(|v| v.voter_id == voter_id)
    }

    pub fn upvotes(&self) -> usize {
        self.votes.iter().filter(|v| v.up).count()
    }

    pub fn downvotes(&self) -> usize {
        self.votes.iter().filter(|v| !v.up).count()
    }

    /// Up minus down, unweighted.
    pub fn vote_score(&self) -> i64 {
        self.upvotes() as i64 - self.downvotes() as i64
    }

    /// Per-milestone vote summary for the presentation layer.
    pub fn vote_summary(&self) -> VoteSummary {
        let upvotes = self.upvotes();
        let downvotes = self.downvotes();
        let total = upvotes + downvotes;
        VoteSummary {
            upvotes,
            downvotes,
            total,
            score: upvotes as i64 - downvotes as i64,
            confidence: if total > 0 {
                upvotes as f64 / total as f64
            } else {
                0.5
            },
        }
    }

    /// Link this milestone to `prerequisite_id`, keeping both sides in step.
    pub(crate) fn link(&mut self, prerequisite_id: &str, edge: EdgeSpec) {
        if self.has_predecessor(prerequisite_id) {
            return;
        }
        self.predecessors.push(prerequisite_id.to_string());
        self.causal_relationships
            .push(edge.relationship(prerequisite_id, &self.id));
    }

    /// Drop the link to `prerequisite_id` on both sides, returning the old record.
    pub(crate) fn unlink(&mut self, prerequisite_id: &str) -> Option<CausalRelationship> {
        self.predecessors.retain(|p| p != prerequisite_id);
        let pos = self
            .causal_relationships
            .iter()
            .position(|r| r.prerequisite_id == prerequisite_id)?;
        Some(self.causal_relationships.remove(pos))
    }
}

/// Vote counts for one milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VoteSummary {
    pub upvotes: usize,
    pub downvotes: usize,
    pub total: usize,
    /// Up minus down
    pub score: i64,
    /// Share of up votes, 0.5 when nobody voted
    pub confidence: f64,
}

/// A career goal and the milestones leading to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Goal {
    /// Goal id, also the id of node 0 in the adjacency view
    pub id: String,
    /// Human-readable goal title
    pub title: String,
    /// Milestones keyed by id
    pub milestones: BTreeMap<String, Milestone>,
    /// Bumped on every committed mutation
    #[serde(skip)]
    #[cfg_attr(feature = "typescript", ts(skip))]
    pub(crate) generation: u64,
}

impl Goal {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            milestones: BTreeMap::new(),
            generation: 0,
        }
    }

    /// Mutation counter; views built at an older generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn milestone(&self, id: &str) -> Option<&Milestone> {
        self.milestones.get(id)
    }

    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    /// Whether `id` names this goal or one of its milestones.
    pub fn resolves(&self, id: &str) -> bool {
        id == self.id || self.milestones.contains_key(id)
    }

    /// Milestones ordered by creation time, ties broken by id.
    pub fn milestones_ordered(&self) -> Vec<&Milestone> {
        let mut ordered: Vec<&Milestone> = self.milestones.values().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        ordered
    }

    /// Milestones that list `id` as a predecessor.
    pub fn dependents_of(&self, id: &str) -> Vec<&Milestone> {
        self.milestones
            .values()
            .filter(|m| m.has_predecessor(id))
            .collect()
    }

    /// Every causal relationship in the goal.
    pub fn relationships(&self) -> impl Iterator<Item = &CausalRelationship> {
        self.milestones
            .values()
            .flat_map(|m| m.causal_relationships.iter())
    }

    /// Relationships between two milestones (goal wiring excluded).
    pub fn causal_relationships(&self) -> impl Iterator<Item = &CausalRelationship> {
        self.relationships()
            .filter(move |r| r.prerequisite_id != self.id)
    }
}

/// A person and the goals they are working toward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Person {
    pub id: String,
    /// Goals keyed by id
    pub goals: BTreeMap<String, Goal>,
    /// Display order of goals
    pub goal_order: Vec<String>,
}

impl Person {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goals: BTreeMap::new(),
            goal_order: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_timestamps() {
        let zoned = lenient_time::parse("2024-01-01T10:00:00+02:00").unwrap();
        let naive = lenient_time::parse("2024-01-01T08:00:00").unwrap();
        assert_eq!(zoned, naive);
        let micros = lenient_time::parse("2024-01-01T08:00:00.123456").unwrap();
        assert_eq!(micros.timestamp_subsec_micros(), 123456);
        assert!(lenient_time::parse("yesterday").is_none());

        let vote: Vote =
            serde_json::from_str(r#"{"vote": false, "user_id": "u7", "timestamp": "2024-01-01T08:00:00"}"#)
                .unwrap();
        assert_eq!(vote.voter_id, "u7");
        assert!(!vote.up);
        assert_eq!(vote.timestamp, naive);
    }

    #[test]
    fn test_relationship_type_serde() {
        let json = serde_json::to_string(&RelationshipType::MutualReinforcement).unwrap();
        assert_eq!(json, "\"mutual_reinforcement\"");
        let parsed: RelationshipType = serde_json::from_str("\"direct_cause\"").unwrap();
        assert_eq!(parsed, RelationshipType::DirectCause);
        assert_eq!(parsed.as_str(), "direct_cause");
    }

    #[test]
    fn test_link_and_unlink_keep_both_sides() {
        let mut m = Milestone::new("ms_1", "Learn Rust", 7);
        m.link("goal", EdgeSpec::goal_link());
        m.link("goal", EdgeSpec::goal_link());
        assert_eq!(m.predecessors, vec!["goal".to_string()]);
        assert_eq!(m.causal_relationships.len(), 1);

        let removed = m.unlink("goal").unwrap();
        assert_eq!(removed.relationship_type, RelationshipType::Enables);
        assert!(m.predecessors.is_empty());
        assert!(m.causal_relationships.is_empty());
    }

    #[test]
    fn test_vote_summary_without_votes() {
        let m = Milestone::new("ms_1", "Learn Rust", 5);
        let summary = m.vote_summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.confidence, 0.5);
    }

    #[test]
    fn test_vote_alias() {
        let vote: Vote = serde_json::from_str(
            r#"{"voter_id":"u1","vote":false,"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!vote.up);
        assert_eq!(vote.weight, 1.0);
    }
}
