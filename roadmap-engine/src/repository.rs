//! Session repository - one exclusive mutation point per person and goal.
//!
//! A session is created when a person's goal is first opened and torn down
//! when the caller releases it. All mutation of a goal goes through its
//! session's write lock, so the adjacency view, the voting sessions and the
//! strategy selector never observe a half-applied change. Reads share the
//! lock in read mode.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use milestone_graph::{
    AdjacencyView, CausalInsights, ConsistencyChecker, Goal, GraphError, Person,
    StructureAnalyzer, StructureVerifier, VerificationReport, ViewCache, Vote,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::consensus::{
    ApprovalDecision, Conclusion, ConsensusEngine, ConsensusLevel, ConsensusResult,
    SessionStatus, SessionTracker, VoterHistory, VotingAnalytics,
};
use crate::groups::{GroupAnalyzer, GroupReport};
use crate::storage::RoadmapStorage;
use crate::strategy::{
    Delegation, SelectorState, Strategy, StrategyRecommendation, StrategySelector,
};
use crate::types::{EngineError, Result};

#[cfg(feature = "typescript")]
use ts_rs::TS;

type SessionKey = (String, String);

/// Live state for one goal.
#[derive(Debug)]
pub struct GoalSession {
    person_id: String,
    goal: Goal,
    view: ViewCache,
    voting: SessionTracker,
    strategy: StrategySelector,
    opened_at: DateTime<Utc>,
    /// Set once persisted by `release`; stale handles must not write
    released: bool,
}

impl GoalSession {
    fn new(person_id: &str, goal: Goal, config: &EngineConfig) -> Self {
        let mut view = ViewCache::new();
        view.rebuild(&goal);
        let mut voting =
            SessionTracker::with_engine(ConsensusEngine::with_config(config.consensus.clone()));
        voting.sync(&goal);
        Self {
            person_id: person_id.to_string(),
            goal,
            view,
            voting,
            strategy: StrategySelector::with_config(config.strategy.clone()),
            opened_at: Utc::now(),
            released: false,
        }
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn view(&self) -> Result<&AdjacencyView> {
        Ok(self.view.get(&self.goal)?)
    }

    /// First concluded milestone whose votes differ from `before`.
    fn concluded_vote_change(&self, before: &Goal) -> Option<String> {
        self.voting
            .sessions()
            .filter(|s| s.is_concluded())
            .find(|s| {
                let old = before.milestone(&s.milestone_id).map(|m| m.votes.as_slice());
                let new = self.goal.milestone(&s.milestone_id).map(|m| m.votes.as_slice());
                old != new
            })
            .map(|s| s.milestone_id.clone())
    }

    /// Rebuild derived state after a mutation.
    fn refresh(&mut self, groups: &GroupAnalyzer) -> Result<()> {
        let view = self.view.rebuild(&self.goal);
        let goal = &self.goal;
        let pruned = self.voting.prune(|id| goal.milestone(id).is_some());
        if pruned > 0 {
            debug!(goal_id = %goal.id, pruned, "Dropped voting sessions of removed milestones");
        }
        if matches!(
            self.strategy.state(),
            SelectorState::Active | SelectorState::AwaitingChoice | SelectorState::Delegated(_)
        ) {
            let report = groups.analyze(goal, view);
            self.strategy.evaluate(&report)?;
        }
        Ok(())
    }
}

/// Point-in-time copy of a goal and its view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GoalSnapshot {
    pub person_id: String,
    pub goal: Goal,
    pub view: AdjacencyView,
}

/// Consensus for one milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MilestoneConsensus {
    pub milestone_id: String,
    pub name: String,
    pub result: ConsensusResult,
    pub decision: ApprovalDecision,
    pub level: ConsensusLevel,
}

/// Everything derived from one snapshot of a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RoadmapAnalysis {
    pub person_id: String,
    pub goal_id: String,
    pub fingerprint: String,
    pub verification: VerificationReport,
    pub insights: CausalInsights,
    pub groups: GroupReport,
    pub consensus: Vec<MilestoneConsensus>,
    pub strategy: StrategyRecommendation,
    pub selector_state: SelectorState,
    pub analyzed_at: DateTime<Utc>,
}

/// Stateless analysis pipeline configured from an [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct Analyzers {
    pub verifier: StructureVerifier,
    pub groups: GroupAnalyzer,
    pub consensus: ConsensusEngine,
    pub strategy: StrategySelector,
}

impl Analyzers {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            verifier: StructureVerifier::new(
                StructureAnalyzer::with_weights(config.structure.clone()),
                ConsistencyChecker::with_rules(config.consistency.clone()),
            ),
            groups: GroupAnalyzer::with_config(config.groups.clone()),
            consensus: ConsensusEngine::with_config(config.consensus.clone()),
            strategy: StrategySelector::with_config(config.strategy.clone()),
        }
    }

    /// Run every analysis over one goal and its current view.
    pub fn analyze(
        &self,
        person_id: &str,
        goal: &Goal,
        view: &AdjacencyView,
        selector_state: SelectorState,
    ) -> RoadmapAnalysis {
        let verification = self.verifier.verify(goal, view);
        let insights = CausalInsights::from_goal(goal);
        let groups = self.groups.analyze(goal, view);
        let strategy = self.strategy.recommend(&groups);

        let consensus = goal
            .milestones_ordered()
            .into_iter()
            .map(|m| {
                let result = self.consensus.calculate(&m.votes);
                MilestoneConsensus {
                    milestone_id: m.id.clone(),
                    name: m.name.clone(),
                    decision: self.consensus.decide(&result),
                    level: result.level(),
                    result,
                }
            })
            .collect();

        RoadmapAnalysis {
            person_id: person_id.to_string(),
            goal_id: goal.id.clone(),
            fingerprint: view.fingerprint(),
            verification,
            insights,
            groups,
            consensus,
            strategy,
            selector_state,
            analyzed_at: Utc::now(),
        }
    }
}

/// Owns every open goal session.
pub struct RoadmapRepository {
    storage: Arc<dyn RoadmapStorage>,
    config: EngineConfig,
    analyzers: Analyzers,
    sessions: DashMap<SessionKey, Arc<RwLock<GoalSession>>>,
    /// Serializes load-modify-save of a person's document
    person_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RoadmapRepository {
    pub fn new(storage: Arc<dyn RoadmapStorage>) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: Arc<dyn RoadmapStorage>, config: EngineConfig) -> Self {
        Self {
            storage,
            analyzers: Analyzers::from_config(&config),
            config,
            sessions: DashMap::new(),
            person_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Keys of currently open sessions.
    pub fn open_sessions(&self) -> Vec<(String, String)> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_open(&self, person_id: &str, goal_id: &str) -> bool {
        self.sessions
            .contains_key(&(person_id.to_string(), goal_id.to_string()))
    }

    fn person_lock(&self, person_id: &str) -> Arc<Mutex<()>> {
        self.person_locks
            .entry(person_id.to_string())
            .or_default()
            .clone()
    }

    fn session(&self, person_id: &str, goal_id: &str) -> Result<Arc<RwLock<GoalSession>>> {
        self.sessions
            .get(&(person_id.to_string(), goal_id.to_string()))
            .map(|s| s.value().clone())
            .ok_or_else(|| {
                EngineError::not_found(format!("open session for {person_id}/{goal_id}"))
            })
    }

    async fn read(&self, person_id: &str, goal_id: &str) -> Result<OwnedRwLockReadGuard<GoalSession>> {
        let guard = self.session(person_id, goal_id)?.read_owned().await;
        if guard.released {
            return Err(EngineError::not_found(format!(
                "open session for {person_id}/{goal_id}"
            )));
        }
        Ok(guard)
    }

    async fn write(&self, person_id: &str, goal_id: &str) -> Result<OwnedRwLockWriteGuard<GoalSession>> {
        let guard = self.session(person_id, goal_id)?.write_owned().await;
        if guard.released {
            return Err(EngineError::not_found(format!(
                "open session for {person_id}/{goal_id}"
            )));
        }
        Ok(guard)
    }

    /// Create a goal for a person, creating the person on first reference, and open it.
    pub async fn create_goal(&self, person_id: &str, title: &str) -> Result<String> {
        let lock = self.person_lock(person_id);
        let _guard = lock.lock().await;

        let mut person = self
            .storage
            .load_person(person_id)
            .await?
            .unwrap_or_else(|| Person::new(person_id));
        let goal_id = person.create_goal(title);
        let goal = person.goal(&goal_id)?.clone();
        self.storage.save_person(&person).await?;

        self.insert_session(person_id, goal);
        info!(person_id = %person_id, goal_id = %goal_id, "Goal created");
        Ok(goal_id)
    }

    /// Open a session for an existing goal. Opening an open session is a no-op.
    pub async fn open(&self, person_id: &str, goal_id: &str) -> Result<()> {
        if self.is_open(person_id, goal_id) {
            return Ok(());
        }
        let person = self
            .storage
            .load_person(person_id)
            .await?
            .ok_or_else(|| GraphError::person_not_found(person_id))?;
        let goal = person.goal(goal_id)?.clone();
        self.insert_session(person_id, goal);
        info!(
            person_id = %person_id,
            goal_id = %goal_id,
            backend = self.storage.id(),
            "Session opened"
        );
        Ok(())
    }

    fn insert_session(&self, person_id: &str, goal: Goal) {
        let key = (person_id.to_string(), goal.id.clone());
        let session = GoalSession::new(person_id, goal, &self.config);
        self.sessions
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(session)));
    }

    /// Apply a structural change under the goal's write lock.
    ///
    /// The closure sees the live goal; store operations are all-or-nothing,
    /// so a failed call leaves it unchanged. Vote changes made here reach the
    /// open voting sessions. Changing votes of a concluded session rolls the
    /// whole closure back.
    pub async fn mutate<T, F>(&self, person_id: &str, goal_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Goal) -> milestone_graph::Result<T>,
    {
        let mut guard = self.write(person_id, goal_id).await?;
        let before = guard.goal.clone();
        let outcome = f(&mut guard.goal);
        if guard.goal.generation() == before.generation() {
            return Ok(outcome?);
        }
        if let Some(frozen) = guard.concluded_vote_change(&before) {
            warn!(milestone_id = %frozen, "Rolling back vote change on concluded session");
            guard.goal = before;
            guard.refresh(&self.analyzers.groups)?;
            return Err(EngineError::SessionConcluded(frozen));
        }
        let GoalSession { goal, voting, .. } = &mut *guard;
        voting.sync(goal);
        guard.refresh(&self.analyzers.groups)?;
        Ok(outcome?)
    }

    pub async fn snapshot(&self, person_id: &str, goal_id: &str) -> Result<GoalSnapshot> {
        let guard = self.read(person_id, goal_id).await?;
        Ok(GoalSnapshot {
            person_id: guard.person_id.clone(),
            view: guard.view()?.clone(),
            goal: guard.goal.clone(),
        })
    }

    /// Record a vote and feed it to the milestone's voting session.
    ///
    /// Returns the session's conclusion when this vote concluded it.
    pub async fn record_vote(
        &self,
        person_id: &str,
        goal_id: &str,
        milestone_id: &str,
        voter_id: &str,
        up: bool,
        weight: f64,
    ) -> Result<Option<Conclusion>> {
        let mut guard = self.write(person_id, goal_id).await?;
        if guard.voting.is_concluded(milestone_id) {
            debug!(milestone_id = %milestone_id, voter = %voter_id, "Vote after conclusion rejected");
            return Err(EngineError::SessionConcluded(milestone_id.to_string()));
        }

        guard.goal.record_vote(milestone_id, voter_id, up, weight)?;
        let vote: Option<Vote> = guard
            .goal
            .milestone(milestone_id)
            .and_then(|m| m.vote_by(voter_id))
            .cloned();
        let vote = vote.ok_or_else(|| {
            GraphError::InvariantViolation(format!(
                "vote by '{voter_id}' missing from '{milestone_id}' after recording"
            ))
        })?;

        let conclusion = match guard.voting.cast(milestone_id, vote) {
            Ok(conclusion) => conclusion,
            Err(e) => {
                warn!(milestone_id = %milestone_id, voter = %voter_id, error = %e, "Rolling back vote");
                guard.goal.clear_vote(milestone_id, voter_id)?;
                guard.refresh(&self.analyzers.groups)?;
                return Err(e);
            }
        };
        guard.refresh(&self.analyzers.groups)?;
        Ok(conclusion)
    }

    /// Clear a vote so the voter may vote again. Not allowed once the session concluded.
    pub async fn clear_vote(
        &self,
        person_id: &str,
        goal_id: &str,
        milestone_id: &str,
        voter_id: &str,
    ) -> Result<Vote> {
        let mut guard = self.write(person_id, goal_id).await?;
        if guard.voting.is_concluded(milestone_id) {
            return Err(EngineError::SessionConcluded(milestone_id.to_string()));
        }
        let vote = guard.goal.clear_vote(milestone_id, voter_id)?;
        guard.voting.retract(milestone_id, voter_id)?;
        guard.refresh(&self.analyzers.groups)?;
        Ok(vote)
    }

    pub async fn voting_status(
        &self,
        person_id: &str,
        goal_id: &str,
        milestone_id: &str,
    ) -> Result<Option<SessionStatus>> {
        let guard = self.read(person_id, goal_id).await?;
        Ok(guard.voting.status(milestone_id, Utc::now()))
    }

    /// Close a milestone's voting session now.
    pub async fn close_voting(
        &self,
        person_id: &str,
        goal_id: &str,
        milestone_id: &str,
    ) -> Result<Conclusion> {
        let mut guard = self.write(person_id, goal_id).await?;
        guard.voting.close(milestone_id, Utc::now())
    }

    /// Conclude every voting session whose window has elapsed.
    pub async fn sweep_voting(&self, person_id: &str, goal_id: &str) -> Result<usize> {
        let mut guard = self.write(person_id, goal_id).await?;
        Ok(guard.voting.sweep(Utc::now()))
    }

    pub async fn voting_analytics(&self, person_id: &str, goal_id: &str) -> Result<VotingAnalytics> {
        let guard = self.read(person_id, goal_id).await?;
        Ok(guard.voting.analytics())
    }

    pub async fn voter_history(
        &self,
        person_id: &str,
        goal_id: &str,
        voter_id: &str,
        limit: usize,
    ) -> Result<VoterHistory> {
        let guard = self.read(person_id, goal_id).await?;
        Ok(guard.voting.user_history(voter_id, limit))
    }

    /// Full analysis from one consistent snapshot.
    pub async fn analyze(&self, person_id: &str, goal_id: &str) -> Result<RoadmapAnalysis> {
        let guard = self.read(person_id, goal_id).await?;
        let view = guard.view()?;
        Ok(self
            .analyzers
            .analyze(person_id, &guard.goal, view, guard.strategy.state()))
    }

    /// Start strategy selection; returns the first recommendation.
    pub async fn begin_strategy(
        &self,
        person_id: &str,
        goal_id: &str,
    ) -> Result<StrategyRecommendation> {
        let mut guard = self.write(person_id, goal_id).await?;
        guard.strategy.begin()?;
        let GoalSession {
            goal,
            view,
            strategy,
            ..
        } = &mut *guard;
        let report = self.analyzers.groups.analyze(goal, view.get(goal)?);
        Ok(strategy.evaluate(&report)?.clone())
    }

    pub async fn choose_strategy(
        &self,
        person_id: &str,
        goal_id: &str,
        choice: Strategy,
    ) -> Result<Delegation> {
        let mut guard = self.write(person_id, goal_id).await?;
        guard.strategy.choose(choice)
    }

    pub async fn complete_strategy(&self, person_id: &str, goal_id: &str) -> Result<()> {
        let mut guard = self.write(person_id, goal_id).await?;
        guard.strategy.complete()
    }

    pub async fn strategy_state(&self, person_id: &str, goal_id: &str) -> Result<SelectorState> {
        let guard = self.read(person_id, goal_id).await?;
        Ok(guard.strategy.state())
    }

    /// Persist the goal into its person's document.
    async fn persist(&self, person_id: &str, goals: Vec<Goal>) -> Result<()> {
        let lock = self.person_lock(person_id);
        let _guard = lock.lock().await;

        let mut person = self
            .storage
            .load_person(person_id)
            .await?
            .unwrap_or_else(|| Person::new(person_id));
        for goal in goals {
            person.insert_goal(goal);
        }
        self.storage.save_person(&person).await
    }

    /// Persist and drop a session.
    ///
    /// The write lock is held until the session is gone, so no mutation can
    /// land between the save and the removal. A failed save keeps it open.
    pub async fn release(&self, person_id: &str, goal_id: &str) -> Result<()> {
        let mut guard = self.write(person_id, goal_id).await?;
        self.persist(person_id, vec![guard.goal.clone()]).await?;
        guard.released = true;
        self.sessions
            .remove(&(person_id.to_string(), goal_id.to_string()));
        info!(
            person_id = %person_id,
            goal_id = %goal_id,
            open_secs = (Utc::now() - guard.opened_at).num_seconds(),
            "Session released"
        );
        Ok(())
    }

    /// Persist every open session without releasing it.
    pub async fn flush_all(&self) -> Result<usize> {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|e| (e.key().0.clone(), e.value().clone()))
            .collect();

        let mut by_person: BTreeMap<String, Vec<Goal>> = BTreeMap::new();
        for (person_id, session) in handles {
            let goal = session.read().await.goal.clone();
            by_person.entry(person_id).or_default().push(goal);
        }

        let count = by_person.values().map(Vec::len).sum();
        let results = join_all(
            by_person
                .into_iter()
                .map(|(person_id, goals)| async move { self.persist(&person_id, goals).await }),
        )
        .await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        info!(goals = count, "Flushed open sessions");
        Ok(count)
    }
}
