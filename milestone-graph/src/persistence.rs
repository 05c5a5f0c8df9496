//! Persisted document shapes and legacy migration.
//!
//! Storage is owned by the caller; this module only converts between the
//! JSON shape and the typed aggregates. Loading accepts two legacy forms:
//! a goal whose `milestones` is a sequence instead of a map, and a
//! milestone carrying a singular `predecessor` instead of `predecessors`.
//! Legacy timestamps may be naive and legacy votes may lack a voter id.

use chrono::{DateTime, Duration, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::{milestone_id, GraphStore};
use crate::types::{
    lenient_time, CausalRelationship, EdgeSpec, Goal, Milestone, Person, Vote, DEFAULT_SCORE,
};

/// Every person, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreDocument(pub BTreeMap<String, PersonDocument>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonDocument {
    #[serde(default)]
    pub roadmaps: BTreeMap<String, GoalDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_order: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub milestones: MilestonesField,
}

/// Current map form, or the legacy ordered sequence.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MilestonesField {
    Map(BTreeMap<String, MilestoneDocument>),
    Sequence(Vec<MilestoneDocument>),
}

// Dispatch on the JSON shape so a bad milestone reports its own error.
impl<'de> Deserialize<'de> for MilestonesField {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_array() {
            serde_json::from_value(value).map(Self::Sequence).map_err(D::Error::custom)
        } else if value.is_object() {
            serde_json::from_value(value).map(Self::Map).map_err(D::Error::custom)
        } else if value.is_null() {
            Ok(Self::default())
        } else {
            Err(D::Error::custom(format!(
                "milestones must be a map or a sequence, found {value}"
            )))
        }
    }
}

impl Default for MilestonesField {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_score")]
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessors: Option<Vec<String>>,
    /// Legacy singular form
    #[serde(default, skip_serializing)]
    pub predecessor: Option<String>,
    #[serde(default)]
    pub causal_relationships: Vec<CausalRelationship>,
    #[serde(default)]
    pub votes: Vec<Vote>,
    #[serde(
        default,
        deserialize_with = "lenient_time::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_score() -> u8 {
    DEFAULT_SCORE
}

impl From<&Milestone> for MilestoneDocument {
    fn from(m: &Milestone) -> Self {
        Self {
            id: Some(m.id.clone()),
            name: m.name.clone(),
            score: m.score,
            predecessors: Some(m.predecessors.clone()),
            predecessor: None,
            causal_relationships: m.causal_relationships.clone(),
            votes: m.votes.clone(),
            created_at: Some(m.created_at),
        }
    }
}

impl From<&Goal> for GoalDocument {
    fn from(goal: &Goal) -> Self {
        Self {
            title: goal.title.clone(),
            milestones: MilestonesField::Map(
                goal.milestones
                    .iter()
                    .map(|(id, m)| (id.clone(), MilestoneDocument::from(m)))
                    .collect(),
            ),
        }
    }
}

impl From<&Person> for PersonDocument {
    fn from(person: &Person) -> Self {
        Self {
            roadmaps: person
                .goals
                .iter()
                .map(|(id, g)| (id.clone(), GoalDocument::from(g)))
                .collect(),
            goal_order: person.goal_order.clone(),
        }
    }
}

impl MilestoneDocument {
    fn into_milestone(self, id: String, created_at: DateTime<Utc>) -> Milestone {
        let predecessors = match (self.predecessors, self.predecessor) {
            (Some(list), _) => list,
            (None, Some(single)) if !single.is_empty() => vec![single],
            _ => Vec::new(),
        };
        let votes = legacy_votes(&id, self.votes);
        Milestone {
            id,
            name: self.name,
            score: self.score,
            predecessors,
            causal_relationships: self.causal_relationships,
            votes,
            created_at: self.created_at.unwrap_or(created_at),
        }
    }
}

/// Give anonymous votes a stable id and keep the latest vote per voter.
fn legacy_votes(milestone_id: &str, votes: Vec<Vote>) -> Vec<Vote> {
    let mut kept: Vec<Vote> = Vec::with_capacity(votes.len());
    let mut replaced = 0usize;
    for (i, mut vote) in votes.into_iter().enumerate() {
        if vote.voter_id.trim().is_empty() {
            vote.voter_id = format!("legacy_{milestone_id}_{i}");
        }
        match kept.iter_mut().find(|v| v.voter_id == vote.voter_id) {
            Some(existing) => {
                if vote.timestamp >= existing.timestamp {
                    *existing = vote;
                }
                replaced += 1;
            }
            None => kept.push(vote),
        }
    }
    if replaced > 0 {
        warn!(
            milestone_id = %milestone_id,
            count = replaced,
            "Collapsed repeated legacy votes to one per voter"
        );
    }
    kept
}

/// Build a goal from its document, migrating legacy shapes.
pub fn load_goal(goal_id: &str, doc: GoalDocument) -> Result<Goal> {
    let now = Utc::now();
    let mut goal = Goal::new(goal_id, doc.title);

    match doc.milestones {
        MilestonesField::Map(map) => {
            for (id, m) in map {
                let milestone = m.into_milestone(id.clone(), now);
                goal.milestones.insert(id, milestone);
            }
        }
        MilestonesField::Sequence(list) => {
            warn!(goal_id = %goal_id, count = list.len(), "Migrating legacy milestone sequence");
            for (i, mut m) in list.into_iter().enumerate() {
                let mut id = milestone_id(goal_id, i + 1);
                while goal.milestones.contains_key(&id) {
                    id = milestone_id(goal_id, i + 1);
                }
                m.predecessors = Some(vec![goal_id.to_string()]);
                m.causal_relationships.clear();
                let created = now + Duration::microseconds(i as i64);
                let milestone = m.into_milestone(id.clone(), created);
                goal.milestones.insert(id, milestone);
            }
        }
    }

    repair_missing_relationships(&mut goal);
    goal.check_invariants()?;
    Ok(goal)
}

/// Synthesize goal-link style relationships for bare legacy predecessors.
fn repair_missing_relationships(goal: &mut Goal) {
    let goal_id = goal.id.clone();
    for m in goal.milestones.values_mut() {
        let covered: BTreeSet<String> = m
            .causal_relationships
            .iter()
            .map(|r| r.prerequisite_id.clone())
            .collect();
        let missing: Vec<String> = m
            .predecessors
            .iter()
            .filter(|p| !covered.contains(*p))
            .cloned()
            .collect();
        if missing.is_empty() {
            continue;
        }
        for p in &missing {
            m.causal_relationships
                .push(EdgeSpec::goal_link().relationship(p, &m.id));
        }
        warn!(
            goal_id = %goal_id,
            milestone_id = %m.id,
            count = missing.len(),
            "Synthesized relationships for legacy predecessors"
        );
    }
}

pub fn load_person(person_id: &str, doc: PersonDocument) -> Result<Person> {
    let mut person = Person::new(person_id);
    let mut order: Vec<String> = doc
        .goal_order
        .into_iter()
        .filter(|id| doc.roadmaps.contains_key(id))
        .collect();
    for id in doc.roadmaps.keys() {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
    for (goal_id, goal_doc) in doc.roadmaps {
        let goal = load_goal(&goal_id, goal_doc)?;
        person.goals.insert(goal_id, goal);
    }
    person.goal_order = order;
    Ok(person)
}

pub fn person_from_json(person_id: &str, json: &str) -> Result<Person> {
    let doc: PersonDocument = serde_json::from_str(json)?;
    load_person(person_id, doc)
}

pub fn person_to_json(person: &Person) -> Result<String> {
    Ok(serde_json::to_string_pretty(&PersonDocument::from(person))?)
}

/// Load every person from a store document.
pub fn store_from_json(json: &str) -> Result<GraphStore> {
    let doc: StoreDocument = serde_json::from_str(json)?;
    let mut store = GraphStore::new();
    for (person_id, person_doc) in doc.0 {
        store.insert_person(load_person(&person_id, person_doc)?);
    }
    info!(persons = store.persons().count(), "Loaded graph store");
    Ok(store)
}

pub fn store_to_json(store: &GraphStore) -> Result<String> {
    let doc = StoreDocument(
        store
            .persons()
            .map(|p| (p.id.clone(), PersonDocument::from(p)))
            .collect(),
    );
    Ok(serde_json::to_string_pretty(&doc)?)
}
