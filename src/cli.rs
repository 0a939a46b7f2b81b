use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rf_core::{EpisodeId, ReviewDecisionKind, ReviewTaskId, Stage};

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Transcript-to-video content pipeline")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an episode from a transcript file
    Ingest {
        /// Transcript text file
        #[arg(required = true)]
        transcript: PathBuf,

        /// Episode title
        #[arg(short, long)]
        title: String,
    },

    /// Show one episode, or list all episodes
    Status {
        /// Episode to show
        episode: Option<EpisodeId>,
    },

    /// List stage runs for an episode
    Runs {
        #[arg(required = true)]
        episode: EpisodeId,
    },

    /// List review tasks (open ones by default)
    Reviews {
        /// Show every task for this episode instead
        #[arg(long)]
        episode: Option<EpisodeId>,
    },

    /// Mark a pending review as being looked at
    StartReview {
        #[arg(required = true)]
        task: ReviewTaskId,
    },

    /// Decide an open review
    Decide {
        #[arg(required = true)]
        task: ReviewTaskId,

        /// approved, rejected, or changes_requested
        #[arg(required = true)]
        decision: ReviewDecisionKind,

        /// Who made the decision
        #[arg(long, default_value = "operator")]
        reviewer: String,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Force a stage to regenerate on its next run
    Invalidate {
        #[arg(required = true)]
        episode: EpisodeId,

        #[arg(required = true)]
        stage: Stage,

        /// Why the stage is being invalidated
        #[arg(long, default_value = "operator request")]
        reason: String,
    },

    /// Run the pre-publish safety checks without publishing
    Check {
        #[arg(required = true)]
        episode: EpisodeId,
    },

    /// Publish an approved episode
    Publish {
        #[arg(required = true)]
        episode: EpisodeId,

        /// Go through every check but do not contact the upload service
        #[arg(long)]
        dry_run: bool,

        /// Publish again even if the episode already has a video
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    ValidateConfig {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}
