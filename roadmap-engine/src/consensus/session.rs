//! Voting sessions and per-voter history.
//!
//! A session collects the votes for one milestone until it concludes, either
//! because the window elapsed or because consensus is already strong. After
//! that it is frozen and further votes are rejected.

use chrono::{DateTime, Utc};
use milestone_graph::{Goal, GraphError, Vote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::engine::{ApprovalDecision, ConclusionReason, ConsensusEngine, ConsensusResult};
use crate::types::{EngineError, Result};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Final outcome of a concluded session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Conclusion {
    pub reason: ConclusionReason,
    pub result: ConsensusResult,
    pub decision: ApprovalDecision,
    pub concluded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingSession {
    pub id: String,
    pub milestone_id: String,
    pub started_at: DateTime<Utc>,
    pub votes: Vec<Vote>,
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Concluded,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SessionStatus {
    pub milestone_id: String,
    pub state: SessionState,
    pub total_votes: usize,
    pub approval_score: f64,
    pub confidence: f64,
    /// Hours left in the window; `None` once concluded
    pub time_remaining_hours: Option<f64>,
    pub needs_votes: bool,
}

impl VotingSession {
    pub fn new(milestone_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            milestone_id: milestone_id.into(),
            started_at,
            votes: Vec::new(),
            conclusion: None,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.conclusion.is_some()
    }

    /// Add a vote. Rejects duplicates and anything after conclusion.
    pub fn cast(&mut self, vote: Vote) -> Result<()> {
        if self.is_concluded() {
            return Err(EngineError::SessionConcluded(self.milestone_id.clone()));
        }
        if self.votes.iter().any(|v| v.voter_id == vote.voter_id) {
            return Err(GraphError::AlreadyVoted {
                voter_id: vote.voter_id,
                milestone_id: self.milestone_id.clone(),
            }
            .into());
        }
        self.votes.push(vote);
        Ok(())
    }

    pub fn status(&self, engine: &ConsensusEngine, now: DateTime<Utc>) -> SessionStatus {
        let current = engine.calculate(&self.votes);
        let (state, time_remaining_hours, needs_votes) = if self.is_concluded() {
            (SessionState::Concluded, None, false)
        } else {
            let remaining = engine.window() - (now - self.started_at);
            let hours = (remaining.num_seconds() as f64 / 3600.0).max(0.0);
            (
                SessionState::Active,
                Some(hours),
                self.votes.len() < engine.config().minimum_votes,
            )
        };
        SessionStatus {
            milestone_id: self.milestone_id.clone(),
            state,
            total_votes: current.total_votes,
            approval_score: current.approval_score,
            confidence: current.confidence,
            time_remaining_hours,
            needs_votes,
        }
    }

    /// Conclude if the rule allows it. Returns the conclusion when one exists.
    pub fn try_conclude(
        &mut self,
        engine: &ConsensusEngine,
        now: DateTime<Utc>,
    ) -> Option<&Conclusion> {
        if self.conclusion.is_none() {
            let reason = engine.should_conclude(&self.votes, self.started_at, now)?;
            self.conclude(engine, reason, now);
        }
        self.conclusion.as_ref()
    }

    fn conclude(&mut self, engine: &ConsensusEngine, reason: ConclusionReason, now: DateTime<Utc>) {
        let result = engine.calculate(&self.votes);
        let decision = engine.decide(&result);
        info!(
            milestone_id = %self.milestone_id,
            reason = ?reason,
            decision = %decision.status,
            votes = result.total_votes,
            "Voting session concluded"
        );
        self.conclusion = Some(Conclusion {
            reason,
            result,
            decision,
            concluded_at: now,
        });
    }
}

/// Records kept per voter; older ones are dropped first.
pub const MAX_HISTORY_PER_VOTER: usize = 500;

/// A single vote as seen from the voter's side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VoteRecord {
    pub milestone_id: String,
    pub up: bool,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

impl VoteRecord {
    fn new(milestone_id: &str, vote: &Vote) -> Self {
        Self {
            milestone_id: milestone_id.to_string(),
            up: vote.up,
            weight: vote.weight,
            timestamp: vote.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VoterHistory {
    pub voter_id: String,
    pub total_votes: usize,
    pub positive_votes: usize,
    pub negative_votes: usize,
    pub positive_rate: f64,
    /// Most recent first
    pub recent: Vec<VoteRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConsensusDistribution {
    /// Approval above 0.8
    pub high: usize,
    /// Approval within [0.4, 0.8]
    pub medium: usize,
    /// Approval below 0.4
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VotingAnalytics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub concluded_sessions: usize,
    pub approved_sessions: usize,
    pub approval_rate: f64,
    pub total_votes: usize,
    pub avg_votes_per_session: f64,
    pub unique_voters: usize,
    /// Mean duration of concluded sessions
    pub avg_duration_hours: Option<f64>,
    pub distribution: ConsensusDistribution,
}

/// All voting sessions for one goal, keyed by milestone.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    engine: ConsensusEngine,
    sessions: HashMap<String, VotingSession>,
    history: HashMap<String, Vec<VoteRecord>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: ConsensusEngine) -> Self {
        Self {
            engine,
            ..Default::default()
        }
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Open a session for `milestone_id`, or return the existing one.
    pub fn open(&mut self, milestone_id: &str, now: DateTime<Utc>) -> &VotingSession {
        self.sessions
            .entry(milestone_id.to_string())
            .or_insert_with(|| {
                debug!(milestone_id = %milestone_id, "Voting session opened");
                VotingSession::new(milestone_id, now)
            })
    }

    pub fn session(&self, milestone_id: &str) -> Option<&VotingSession> {
        self.sessions.get(milestone_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &VotingSession> {
        self.sessions.values()
    }

    pub fn is_concluded(&self, milestone_id: &str) -> bool {
        self.sessions
            .get(milestone_id)
            .is_some_and(VotingSession::is_concluded)
    }

    /// Cast a vote, opening the session on first use and concluding it when the rule allows.
    pub fn cast(&mut self, milestone_id: &str, vote: Vote) -> Result<Option<Conclusion>> {
        let now = vote.timestamp;
        let record = VoteRecord::new(milestone_id, &vote);
        let voter_id = vote.voter_id.clone();

        self.open(milestone_id, now);
        let Some(session) = self.sessions.get_mut(milestone_id) else {
            return Err(EngineError::not_found(milestone_id));
        };
        session.cast(vote)?;
        let conclusion = session.try_conclude(&self.engine, now).cloned();

        self.remember(voter_id, record);
        Ok(conclusion)
    }

    fn remember(&mut self, voter_id: String, record: VoteRecord) {
        let records = self.history.entry(voter_id).or_default();
        records.push(record);
        if records.len() > MAX_HISTORY_PER_VOTER {
            let excess = records.len() - MAX_HISTORY_PER_VOTER;
            records.drain(..excess);
        }
    }

    /// Align open sessions with the votes stored on the goal.
    ///
    /// Opens a session for every milestone that carries votes but has none,
    /// starting at its earliest vote. Concluded sessions stay frozen.
    /// Returns how many sessions changed.
    pub fn sync(&mut self, goal: &Goal) -> usize {
        let mut changed = 0;
        for milestone in goal.milestones.values() {
            let tracked = self
                .sessions
                .get(&milestone.id)
                .map(|s| s.votes.as_slice())
                .unwrap_or(&[]);
            if tracked == milestone.votes.as_slice() || self.is_concluded(&milestone.id) {
                continue;
            }
            self.replace_votes(&milestone.id, milestone.votes.clone());
            changed += 1;
        }
        if changed > 0 {
            debug!(goal_id = %goal.id, sessions = changed, "Voting sessions synced from goal");
        }
        changed
    }

    fn replace_votes(&mut self, milestone_id: &str, votes: Vec<Vote>) {
        let started_at = votes
            .iter()
            .map(|v| v.timestamp)
            .min()
            .unwrap_or_else(Utc::now);
        for records in self.history.values_mut() {
            records.retain(|r| r.milestone_id != milestone_id);
        }
        self.history.retain(|_, records| !records.is_empty());
        for vote in &votes {
            self.remember(vote.voter_id.clone(), VoteRecord::new(milestone_id, vote));
        }
        let session = self
            .sessions
            .entry(milestone_id.to_string())
            .or_insert_with(|| VotingSession::new(milestone_id, started_at));
        session.votes = votes;
    }

    /// Remove a voter's vote from an open session.
    pub fn retract(&mut self, milestone_id: &str, voter_id: &str) -> Result<()> {
        let Some(session) = self.sessions.get_mut(milestone_id) else {
            return Ok(());
        };
        if session.is_concluded() {
            return Err(EngineError::SessionConcluded(milestone_id.to_string()));
        }
        session.votes.retain(|v| v.voter_id != voter_id);
        if let Some(records) = self.history.get_mut(voter_id) {
            records.retain(|r| r.milestone_id != milestone_id);
        }
        Ok(())
    }

    /// Drop sessions and vote history for milestones that no longer exist.
    pub fn prune(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, _| keep(id));
        self.history.retain(|_, records| {
            records.retain(|r| keep(&r.milestone_id));
            !records.is_empty()
        });
        before - self.sessions.len()
    }

    /// Force conclusion regardless of the rule.
    pub fn close(&mut self, milestone_id: &str, now: DateTime<Utc>) -> Result<Conclusion> {
        let session = self
            .sessions
            .get_mut(milestone_id)
            .ok_or_else(|| EngineError::not_found(format!("voting session {milestone_id}")))?;
        if session.conclusion.is_none() {
            session.conclude(&self.engine, ConclusionReason::Closed, now);
        }
        session
            .conclusion
            .clone()
            .ok_or_else(|| EngineError::SessionConcluded(milestone_id.to_string()))
    }

    /// Re-check every open session against the clock.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let engine = &self.engine;
        self.sessions
            .values_mut()
            .filter(|s| !s.is_concluded())
            .filter_map(|s| s.try_conclude(engine, now).map(|_| ()))
            .count()
    }

    pub fn status(&self, milestone_id: &str, now: DateTime<Utc>) -> Option<SessionStatus> {
        self.sessions
            .get(milestone_id)
            .map(|s| s.status(&self.engine, now))
    }

    pub fn user_history(&self, voter_id: &str, limit: usize) -> VoterHistory {
        let records = self.history.get(voter_id).map(Vec::as_slice).unwrap_or(&[]);
        let total_votes = records.len();
        let positive_votes = records.iter().filter(|r| r.up).count();
        let mut recent = records.to_vec();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        VoterHistory {
            voter_id: voter_id.to_string(),
            total_votes,
            positive_votes,
            negative_votes: total_votes - positive_votes,
            positive_rate: if total_votes > 0 {
                positive_votes as f64 / total_votes as f64
            } else {
                0.0
            },
            recent,
        }
    }

    pub fn analytics(&self) -> VotingAnalytics {
        let total_sessions = self.sessions.len();
        if total_sessions == 0 {
            return VotingAnalytics::default();
        }
        let concluded: Vec<&Conclusion> = self
            .sessions
            .values()
            .filter_map(|s| s.conclusion.as_ref())
            .collect();
        let approved_sessions = concluded
            .iter()
            .filter(|c| c.decision.final_approval)
            .count();
        let total_votes: usize = self.sessions.values().map(|s| s.votes.len()).sum();
        let unique_voters = self
            .sessions
            .values()
            .flat_map(|s| s.votes.iter().map(|v| v.voter_id.as_str()))
            .collect::<std::collections::HashSet<_>>()
            .len();

        let durations: Vec<f64> = self
            .sessions
            .values()
            .filter_map(|s| {
                s.conclusion
                    .as_ref()
                    .map(|c| (c.concluded_at - s.started_at).num_seconds() as f64 / 3600.0)
            })
            .collect();
        let avg_duration_hours = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        let mut distribution = ConsensusDistribution::default();
        for session in self.sessions.values().filter(|s| !s.votes.is_empty()) {
            let approval = self.engine.calculate(&session.votes).approval_score;
            if approval > 0.8 {
                distribution.high += 1;
            } else if approval >= 0.4 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }

        VotingAnalytics {
            total_sessions,
            active_sessions: total_sessions - concluded.len(),
            concluded_sessions: concluded.len(),
            approved_sessions,
            approval_rate: if concluded.is_empty() {
                0.0
            } else {
                approved_sessions as f64 / concluded.len() as f64
            },
            total_votes,
            avg_votes_per_session: total_votes as f64 / total_sessions as f64,
            unique_voters,
            avg_duration_hours,
            distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn vote_at(voter: &str, up: bool, at: DateTime<Utc>) -> Vote {
        Vote {
            voter_id: voter.to_string(),
            up,
            weight: 1.0,
            timestamp: at,
        }
    }

    #[test]
    fn test_duplicate_voter_rejected() {
        let mut tracker = SessionTracker::new();
        let now = Utc::now();
        tracker.cast("m1", vote_at("alice", true, now)).unwrap();
        let err = tracker.cast("m1", vote_at("alice", false, now)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Graph(GraphError::AlreadyVoted { .. })
        ));
        assert_eq!(tracker.session("m1").unwrap().votes.len(), 1);
    }

    #[test]
    fn test_window_conclusion_then_rejection() {
        let mut tracker = SessionTracker::new();
        let start = Utc::now();
        tracker.cast("m1", vote_at("a", true, start)).unwrap();
        tracker.cast("m1", vote_at("b", true, start)).unwrap();
        assert!(tracker.cast("m1", vote_at("c", false, start)).unwrap().is_none());

        let status = tracker.status("m1", start + Duration::hours(1)).unwrap();
        assert_eq!(status.state, SessionState::Active);
        assert!(!status.needs_votes);
        assert!((status.time_remaining_hours.unwrap() - 23.0).abs() < 0.01);

        let late = start + Duration::hours(25);
        assert_eq!(tracker.sweep(late), 1);
        let conclusion = tracker.session("m1").unwrap().conclusion.clone().unwrap();
        assert_eq!(conclusion.reason, ConclusionReason::WindowElapsed);
        assert!(conclusion.decision.final_approval);

        let err = tracker.cast("m1", vote_at("d", true, late)).unwrap_err();
        assert!(matches!(err, EngineError::SessionConcluded(_)));
    }

    #[test]
    fn test_strong_consensus_concludes_early() {
        let mut tracker = SessionTracker::new();
        let now = Utc::now();
        for i in 0..8 {
            let outcome = tracker.cast("m1", vote_at(&format!("u{i}"), true, now)).unwrap();
            assert!(outcome.is_none());
        }
        // ninth unanimous vote lifts confidence to (0.9 + 1 + 1) / 3
        let conclusion = tracker.cast("m1", vote_at("u8", true, now)).unwrap().unwrap();
        assert_eq!(conclusion.reason, ConclusionReason::StrongConsensus);
        assert!(tracker.is_concluded("m1"));
    }

    #[test]
    fn test_history_and_analytics() {
        let mut tracker = SessionTracker::new();
        let now = Utc::now();
        tracker.cast("m1", vote_at("alice", true, now)).unwrap();
        tracker
            .cast("m2", vote_at("alice", false, now + Duration::seconds(5)))
            .unwrap();
        tracker.cast("m2", vote_at("bob", false, now)).unwrap();

        let history = tracker.user_history("alice", 10);
        assert_eq!(history.total_votes, 2);
        assert_eq!(history.positive_votes, 1);
        assert_eq!(history.recent[0].milestone_id, "m2");
        assert!((history.positive_rate - 0.5).abs() < 1e-9);

        tracker.close("m1", now + Duration::hours(2)).unwrap();
        let analytics = tracker.analytics();
        assert_eq!(analytics.total_sessions, 2);
        assert_eq!(analytics.concluded_sessions, 1);
        assert_eq!(analytics.total_votes, 3);
        assert_eq!(analytics.unique_voters, 2);
        assert!((analytics.avg_duration_hours.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(analytics.distribution.high, 1);
        assert_eq!(analytics.distribution.low, 1);
    }

    #[test]
    fn test_retract_open_vote() {
        let mut tracker = SessionTracker::new();
        let now = Utc::now();
        tracker.cast("m1", vote_at("alice", true, now)).unwrap();
        tracker.retract("m1", "alice").unwrap();
        assert!(tracker.session("m1").unwrap().votes.is_empty());
        assert_eq!(tracker.user_history("alice", 10).total_votes, 0);
        tracker.cast("m1", vote_at("alice", false, now)).unwrap();
    }

    #[test]
    fn test_sync_seeds_sessions_from_stored_votes() {
        let mut goal = Goal::new("g1", "Goal");
        let m1 = goal.add_milestone("Rust", 7, None, None).unwrap();
        let m2 = goal.add_milestone("Go", 5, None, None).unwrap();
        goal.record_vote(&m1, "a", true, 1.0).unwrap();
        goal.record_vote(&m1, "b", true, 1.0).unwrap();

        let mut tracker = SessionTracker::new();
        assert_eq!(tracker.sync(&goal), 1);
        assert_eq!(tracker.session(&m1).unwrap().votes.len(), 2);
        assert!(tracker.session(&m2).is_none());
        assert_eq!(tracker.user_history("a", 10).total_votes, 1);
        assert_eq!(tracker.sync(&goal), 0);

        let late = goal.milestone(&m1).unwrap().votes[1].timestamp + Duration::seconds(1);
        tracker.cast(&m1, vote_at("c", false, late)).unwrap();
        let status = tracker.status(&m1, late).unwrap();
        assert_eq!(status.total_votes, 3);
        assert!(!status.needs_votes);

        // Votes cleared on the goal disappear from the open session.
        goal.clear_vote(&m1, "a").unwrap();
        goal.clear_vote(&m1, "b").unwrap();
        assert_eq!(tracker.sync(&goal), 1);
        assert!(tracker.session(&m1).unwrap().votes.is_empty());
        assert_eq!(tracker.user_history("a", 10).total_votes, 0);
    }

    #[test]
    fn test_sync_leaves_concluded_sessions_frozen() {
        let mut goal = Goal::new("g1", "Goal");
        let m1 = goal.add_milestone("Rust", 7, None, None).unwrap();
        goal.record_vote(&m1, "a", true, 1.0).unwrap();

        let mut tracker = SessionTracker::new();
        tracker.sync(&goal);
        tracker.close(&m1, Utc::now()).unwrap();
        goal.record_vote(&m1, "b", false, 1.0).unwrap();
        assert_eq!(tracker.sync(&goal), 0);
        assert_eq!(tracker.session(&m1).unwrap().votes.len(), 1);
    }

    #[test]
    fn test_prune_drops_history_of_removed_milestones() {
        let mut tracker = SessionTracker::new();
        let now = Utc::now();
        tracker.cast("m1", vote_at("alice", true, now)).unwrap();
        tracker.cast("m2", vote_at("alice", false, now)).unwrap();
        tracker.cast("m2", vote_at("bob", false, now)).unwrap();

        assert_eq!(tracker.prune(|id| id == "m1"), 1);
        let alice = tracker.user_history("alice", 10);
        assert_eq!(alice.total_votes, 1);
        assert_eq!(alice.recent[0].milestone_id, "m1");
        assert_eq!(tracker.user_history("bob", 10).total_votes, 0);
        assert!(!tracker.history.contains_key("bob"));
    }

    #[test]
    fn test_voter_history_is_capped() {
        let mut tracker = SessionTracker::new();
        let start = Utc::now();
        for i in 0..MAX_HISTORY_PER_VOTER + 20 {
            let at = start + Duration::seconds(i as i64);
            tracker.cast(&format!("m{i}"), vote_at("alice", true, at)).unwrap();
        }
        let history = tracker.user_history("alice", 1);
        assert_eq!(history.total_votes, MAX_HISTORY_PER_VOTER);
        assert_eq!(
            history.recent[0].milestone_id,
            format!("m{}", MAX_HISTORY_PER_VOTER + 19)
        );
        assert!(tracker.history["alice"].iter().all(|r| r.milestone_id != "m0"));
    }
}
