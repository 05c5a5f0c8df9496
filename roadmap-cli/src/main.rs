//! Roadmap - operator CLI over person documents on disk.
//!
//! Every command opens the document through the same repository the
//! services use, prints JSON to stdout and leaves the file untouched.

mod args;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::{person_location, Args, Command, GoalArgs};
use roadmap_engine::{
    EngineConfig, GroupReport, JsonFileStorage, RoadmapRepository, RoadmapStorage,
    StrategyRecommendation,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(&args);

    let config = args.engine_config()?;
    debug!(config = ?config, "Engine configuration loaded");

    match &args.command {
        Command::Analyze(goal) => {
            let (repo, person_id) = open_goal(goal, config).await?;
            let analysis = repo.analyze(&person_id, &goal.goal).await?;
            print_json(&analysis)
        }
        Command::Groups(goal) => {
            let (repo, person_id) = open_goal(goal, config).await?;
            let analysis = repo.analyze(&person_id, &goal.goal).await?;
            print_json(&GroupsOutput {
                groups: analysis.groups,
                strategy: analysis.strategy,
            })
        }
        Command::Matrix(goal) => {
            let (repo, person_id) = open_goal(goal, config).await?;
            let snapshot = repo.snapshot(&person_id, &goal.goal).await?;
            print_json(&snapshot.view)
        }
        Command::Check { file } => check(file).await,
    }
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &args.log_level;
        format!("roadmap={level},roadmap_engine={level},milestone_graph={level}").into()
    });
    // stdout carries command output
    let (plain, json) = if args.log_json {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn open_goal(goal: &GoalArgs, config: EngineConfig) -> anyhow::Result<(RoadmapRepository, String)> {
    let (dir, person_id) = person_location(&goal.file)?;
    let repo = RoadmapRepository::with_config(Arc::new(JsonFileStorage::new(dir)), config);
    repo.open(&person_id, &goal.goal)
        .await
        .with_context(|| format!("opening goal '{}' in {}", goal.goal, goal.file.display()))?;
    Ok((repo, person_id))
}

#[derive(Serialize)]
struct GroupsOutput {
    groups: GroupReport,
    strategy: StrategyRecommendation,
}

#[derive(Serialize)]
struct GoalCheck {
    goal_id: String,
    title: String,
    milestones: usize,
    relationships: usize,
}

#[derive(Serialize)]
struct CheckOutput {
    person_id: String,
    goals: Vec<GoalCheck>,
}

/// Loading already migrates and validates; re-check each goal explicitly.
async fn check(file: &std::path::Path) -> anyhow::Result<()> {
    let (dir, person_id) = person_location(file)?;
    let storage = JsonFileStorage::new(dir);
    let person = storage
        .load_person(&person_id)
        .await
        .with_context(|| format!("loading {}", file.display()))?
        .with_context(|| format!("{} does not exist", file.display()))?;

    let mut goals = Vec::new();
    for goal in person.ordered_goals() {
        goal.check_invariants()
            .with_context(|| format!("goal '{}' failed validation", goal.id))?;
        goals.push(GoalCheck {
            goal_id: goal.id.clone(),
            title: goal.title.clone(),
            milestones: goal.len(),
            relationships: goal.relationships().count(),
        });
    }
    info!(person_id = %person_id, goals = goals.len(), "Document valid");
    print_json(&CheckOutput { person_id, goals })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
