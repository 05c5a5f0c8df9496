//! Sub-roadmap discovery and vote-based scoring.
//!
//! A group is a maximal connected set of milestones in the undirected
//! projection of the adjacency view, with the goal node left out so that
//! sibling branches hanging off the goal stay separate.

use milestone_graph::{AdjacencyView, Goal, Milestone};
use tracing::debug;

use super::types::{
    FocusArea, FocusStrategy, GroupClassification, GroupReport, GroupScore, GroupSignals,
    GroupSummary, OverallHealth, RemovalAssessment, RemovalCriterion,
};
use crate::config::GroupConfig;

/// Scores connected milestone groups from their votes.
#[derive(Debug, Clone, Default)]
pub struct GroupAnalyzer {
    config: GroupConfig,
}

impl GroupAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GroupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Connected components over milestones, each in view order.
    pub fn find_groups(&self, view: &AdjacencyView) -> Vec<Vec<String>> {
        let n = view.len();
        let mut seen = vec![false; n];
        let mut groups = Vec::new();

        for start in 1..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut members = Vec::new();
            while let Some(i) = stack.pop() {
                members.push(i);
                for j in view.undirected_neighbors(i) {
                    if j != 0 && !seen[j] {
                        seen[j] = true;
                        stack.push(j);
                    }
                }
            }
            members.sort_unstable();
            groups.push(members.into_iter().map(|i| view.nodes[i].clone()).collect());
        }
        groups
    }

    /// Vote signals for the listed milestones. Unknown ids are skipped.
    pub fn signals(&self, goal: &Goal, milestone_ids: &[String]) -> GroupSignals {
        let milestones: Vec<&Milestone> = milestone_ids
            .iter()
            .filter_map(|id| goal.milestone(id))
            .collect();
        if milestones.is_empty() {
            return GroupSignals::default();
        }

        let mut score_sum = 0i64;
        let mut thumbs_down_count = 0;
        let mut positive_votes = 0;
        let mut negative_votes = 0;
        for m in &milestones {
            let (up, down) = (m.upvotes(), m.downvotes());
            score_sum += up as i64 - down as i64;
            if down > 0 {
                thumbs_down_count += 1;
            }
            positive_votes += up;
            negative_votes += down;
        }
        let total_votes = positive_votes + negative_votes;
        let avg_vote_score = score_sum as f64 / milestones.len() as f64;

        GroupSignals {
            milestones: milestones.len(),
            avg_vote_score,
            thumbs_down_count,
            problematic_score: avg_vote_score
                - thumbs_down_count as f64 * self.config.downvote_penalty,
            confidence: if total_votes > 0 {
                positive_votes as f64 / total_votes as f64
            } else {
                0.5
            },
            total_votes,
            positive_votes,
            negative_votes,
        }
    }

    /// Classification ladder; the first matching rung wins.
    pub fn classify(&self, s: &GroupSignals) -> GroupClassification {
        if s.milestones == 0 {
            return GroupClassification::Empty;
        }
        let c = &self.config.classification;
        let ratio = s.thumbs_down_ratio();
        let avg = s.avg_vote_score;

        if avg >= c.excellent_min_avg && s.confidence > c.excellent_min_confidence {
            GroupClassification::Excellent
        } else if avg >= c.good_min_avg && ratio < c.good_max_ratio {
            GroupClassification::Good
        } else if avg >= c.attention_min_avg && ratio < c.attention_max_ratio {
            GroupClassification::NeedsAttention
        } else if ratio >= c.critical_min_ratio || avg < c.critical_max_avg {
            GroupClassification::Critical
        } else {
            GroupClassification::Problematic
        }
    }

    /// Removal needs several independent criteria to agree.
    pub fn assess_removal(&self, s: &GroupSignals) -> RemovalAssessment {
        if s.milestones == 0 {
            return RemovalAssessment::default();
        }
        let r = &self.config.removal;
        let mut criteria = Vec::new();
        if s.thumbs_down_ratio() >= r.thumbs_down_ratio {
            criteria.push(RemovalCriterion::HighThumbsDownRatio);
        }
        if s.problematic_score < r.problematic_score {
            criteria.push(RemovalCriterion::VeryLowProblematicScore);
        }
        if s.confidence < r.low_confidence && s.avg_vote_score < 0.0 {
            criteria.push(RemovalCriterion::LowConfidenceNegative);
        }
        if s.total_votes >= r.engaged_min_votes && s.avg_vote_score < r.engaged_max_avg {
            criteria.push(RemovalCriterion::EngagedNegative);
        }
        RemovalAssessment {
            recommended: criteria.len() >= r.min_criteria,
            criteria,
        }
    }

    /// How urgently the conversation should turn to this group (0.0 - 1.0).
    pub fn focus_priority(&self, s: &GroupSignals) -> f64 {
        if s.milestones == 0 {
            return 0.0;
        }
        let mut priority = s.thumbs_down_ratio() * 0.4;
        if s.avg_vote_score < 0.0 {
            priority += s.avg_vote_score.abs() * 0.1;
        }
        if s.problematic_score < 0.0 {
            priority += s.problematic_score.abs() * 0.1;
        }
        if s.total_votes > 2 {
            priority += (s.total_votes as f64 / 10.0).min(0.2);
        }
        if s.total_votes > 0 && s.confidence < 0.5 {
            priority += (0.5 - s.confidence) * 0.2;
        }
        priority.min(1.0)
    }

    pub fn score_group(&self, goal: &Goal, id: String, milestone_ids: Vec<String>) -> GroupScore {
        let signals = self.signals(goal, &milestone_ids);
        GroupScore {
            id,
            thumbs_down_ratio: signals.thumbs_down_ratio(),
            classification: self.classify(&signals),
            removal: self.assess_removal(&signals),
            focus_priority: self.focus_priority(&signals),
            milestone_ids,
            signals,
        }
    }

    /// Discover, score and summarize every group of a goal.
    pub fn analyze(&self, goal: &Goal, view: &AdjacencyView) -> GroupReport {
        let mut groups: Vec<GroupScore> = self
            .find_groups(view)
            .into_iter()
            .enumerate()
            .map(|(i, ids)| self.score_group(goal, format!("group_{}", i + 1), ids))
            .collect();
        groups.sort_by(|a, b| {
            a.signals
                .problematic_score
                .total_cmp(&b.signals.problematic_score)
        });

        let total_groups = groups.len();
        let removal_candidates = groups.iter().filter(|g| g.removal.recommended).count();
        let high_priority_groups = groups
            .iter()
            .filter(|g| g.focus_priority > self.config.high_priority)
            .count();
        let summary = GroupSummary {
            total_groups,
            removal_candidates,
            high_priority_groups,
            removal_rate: if total_groups > 0 {
                removal_candidates as f64 / total_groups as f64
            } else {
                0.0
            },
            overall_health: self.overall_health(&groups),
        };
        let focus = self.most_problematic(goal, &groups);

        debug!(
            goal_id = %goal.id,
            groups = total_groups,
            removal_candidates,
            health = summary.overall_health.as_str(),
            "Groups analyzed"
        );

        GroupReport {
            groups,
            summary,
            focus,
        }
    }

    pub fn overall_health(&self, groups: &[GroupScore]) -> OverallHealth {
        if groups.is_empty() {
            return OverallHealth::Unknown;
        }
        let total = groups.len() as f64;
        let share = |pred: &dyn Fn(GroupClassification) -> bool| {
            groups.iter().filter(|g| pred(g.classification)).count() as f64 / total
        };
        let h = &self.config.health;

        if share(&|c| c == GroupClassification::Critical) > h.critical_ratio {
            OverallHealth::Critical
        } else if share(&|c| c == GroupClassification::Problematic) > h.problematic_ratio {
            OverallHealth::NeedsAttention
        } else if share(&|c| {
            matches!(c, GroupClassification::Good | GroupClassification::Excellent)
        }) > h.good_ratio
        {
            OverallHealth::Good
        } else {
            OverallHealth::Fair
        }
    }

    /// Focus split for the lowest-scoring group. Expects `groups` sorted.
    pub fn most_problematic(&self, goal: &Goal, groups: &[GroupScore]) -> Option<FocusArea> {
        let worst = groups.first()?;
        let milestones: Vec<&Milestone> = worst
            .milestone_ids
            .iter()
            .filter_map(|id| goal.milestone(id))
            .collect();

        let ids = |pred: &dyn Fn(&Milestone) -> bool| -> Vec<String> {
            milestones
                .iter()
                .filter(|&&m| pred(m))
                .map(|m| m.id.clone())
                .collect()
        };
        let confirmed = ids(&|m| m.upvotes() > 0);
        let problematic = ids(&|m| m.downvotes() > 0);
        let unvoted = ids(&|m| m.votes.is_empty());

        let anchor = milestones
            .iter()
            .filter(|m| m.upvotes() > 0)
            .min_by_key(|m| m.score)
            .map(|m| m.id.clone());

        let focus_strategy = if !problematic.is_empty() {
            FocusStrategy::Problematic
        } else if !confirmed.is_empty() {
            FocusStrategy::Gaps
        } else {
            FocusStrategy::General
        };

        Some(FocusArea {
            group_id: worst.id.clone(),
            confirmed,
            problematic,
            unvoted,
            anchor,
            focus_strategy,
        })
    }
}
