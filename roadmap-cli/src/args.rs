//! Command line arguments.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use roadmap_engine::EngineConfig;
use std::path::{Path, PathBuf};

/// Roadmap - inspect causal career roadmaps
#[derive(Parser, Debug, Clone)]
#[command(name = "roadmap")]
#[command(about = "Analyze career roadmap documents")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Engine configuration (YAML); defaults apply when omitted
    #[arg(long, env = "ROADMAP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ROADMAP_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "ROADMAP_LOG_JSON", global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Full analysis of one goal
    Analyze(GoalArgs),
    /// Group health and strategy recommendation
    Groups(GoalArgs),
    /// Adjacency matrix with labels
    Matrix(GoalArgs),
    /// Validate every goal in a person document
    Check {
        /// Person document; the file stem is the person id
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct GoalArgs {
    /// Person document; the file stem is the person id
    #[arg(long)]
    pub file: PathBuf,

    /// Goal id inside the document
    #[arg(long)]
    pub goal: String,
}

impl Args {
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let Some(path) = &self.config else {
            return Ok(EngineConfig::default());
        };
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        EngineConfig::from_yaml(&yaml).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Split a document path into its directory and person id.
pub fn person_location(file: &Path) -> anyhow::Result<(PathBuf, String)> {
    if file.extension().and_then(|e| e.to_str()) != Some("json") {
        bail!("{} is not a .json document", file.display());
    }
    let person_id = file
        .file_stem()
        .and_then(|s| s.to_str())
        .context("document name is not valid UTF-8")?
        .to_string();
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, person_id))
}
