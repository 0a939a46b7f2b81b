mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use rf_core::config::Config;
use rf_core::{EpisodeId, ReviewDecisionKind, ReviewTaskId, Stage};
use rf_db::pool::{init_pool, DbPool};
use rf_db::queries::{episodes, pipeline_runs, review_tasks};
use rf_pipeline::publish::{self, DryRunUploader};
use rf_pipeline::{review, staleness, EpisodeWorkspace};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=debug,rf_pipeline=debug,rf_db=debug".to_string()
        } else {
            "reelforge=info,rf_pipeline=info,rf_db=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ingest { transcript, title } => ingest(config_path, &transcript, &title),
        Commands::Status { episode } => status(config_path, episode),
        Commands::Runs { episode } => runs(config_path, episode),
        Commands::Reviews { episode } => reviews(config_path, episode),
        Commands::StartReview { task } => start_review(config_path, task),
        Commands::Decide {
            task,
            decision,
            reviewer,
            notes,
        } => decide(config_path, task, decision, &reviewer, notes.as_deref()),
        Commands::Invalidate {
            episode,
            stage,
            reason,
        } => invalidate(config_path, episode, stage, &reason),
        Commands::Check { episode } => check(config_path, episode),
        Commands::Publish {
            episode,
            dry_run,
            force,
        } => run_publish(config_path, episode, dry_run, force),
        Commands::ValidateConfig { config } => {
            let path = config.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

/// Load config and open the database it points at.
fn open(config_path: Option<&Path>) -> Result<(Config, DbPool)> {
    let config = Config::load_or_default(config_path);
    tracing::debug!("Opening database at {}", config.storage.db_path.display());
    let pool = init_pool(&config.storage.db_path)?;
    Ok((config, pool))
}

fn ingest(config_path: Option<&Path>, transcript: &Path, title: &str) -> Result<()> {
    let (config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let episode = rf_pipeline::ingest_transcript(&conn, &config, transcript, title)?;
    println!("{}", episode.id);
    Ok(())
}

fn status(config_path: Option<&Path>, episode: Option<EpisodeId>) -> Result<()> {
    let (_config, pool) = open(config_path)?;
    let conn = pool.get()?;

    let Some(id) = episode else {
        let all = episodes::list_episodes(&conn, None)?;
        if all.is_empty() {
            println!("No episodes.");
        }
        for ep in all {
            println!("{}  {:<17} {}", ep.id, ep.status.as_str(), ep.title);
        }
        return Ok(());
    };

    let ep = episodes::require_episode(&conn, id)?;
    println!("Episode: {}", ep.id);
    println!("Title: {}", ep.title);
    println!("Status: {}", ep.status);
    println!("Pipeline version: {}", ep.pipeline_version);
    if !ep.tags.is_empty() {
        println!("Tags: {}", ep.tags.join(", "));
    }
    if let Some(ref err) = ep.error_message {
        println!("Last error: {err}");
    }
    if let Some(ref url) = ep.youtube_url {
        println!("Published: {url}");
    }
    println!("Spent: ${:.4}", pipeline_runs::total_cost(&conn, ep.id)?);
    Ok(())
}

fn runs(config_path: Option<&Path>, episode: EpisodeId) -> Result<()> {
    let (_config, pool) = open(config_path)?;
    let conn = pool.get()?;
    episodes::require_episode(&conn, episode)?;

    for run in pipeline_runs::list_runs(&conn, episode)? {
        print!(
            "{}  {:<10} {:<9} {:>7} in {:>7} out ${:.4}",
            run.started_at,
            run.stage.as_str(),
            run.status.as_str(),
            run.input_tokens,
            run.output_tokens,
            run.cost_usd
        );
        if let Some(ref err) = run.error_message {
            print!("  {err}");
        }
        println!();
    }
    Ok(())
}

fn reviews(config_path: Option<&Path>, episode: Option<EpisodeId>) -> Result<()> {
    let (_config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let tasks = match episode {
        Some(id) => review_tasks::list_review_tasks(&conn, id)?,
        None => review_tasks::list_open_tasks(&conn)?,
    };
    if tasks.is_empty() {
        println!("No review tasks.");
    }
    for task in tasks {
        println!(
            "{}  {}  {:<10} {:<17} {} file(s)",
            task.id,
            task.episode_id,
            task.stage.as_str(),
            task.status.as_str(),
            task.artifact_paths.len()
        );
    }
    Ok(())
}

fn start_review(config_path: Option<&Path>, task: ReviewTaskId) -> Result<()> {
    let (_config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let task = review::start_review(&conn, task)?;
    println!("Review {} is {}", task.id, task.status);
    for path in &task.artifact_paths {
        println!("  {path}");
    }
    Ok(())
}

fn decide(
    config_path: Option<&Path>,
    task: ReviewTaskId,
    decision: ReviewDecisionKind,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<()> {
    let (config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let decided =
        review::decide_review(&conn, &config.storage.data_dir, task, decision, reviewer, notes)?;
    println!(
        "{} review {} is now {}",
        decided.task.stage, decided.task.id, decided.task.status
    );
    Ok(())
}

fn invalidate(
    config_path: Option<&Path>,
    episode: EpisodeId,
    stage: Stage,
    reason: &str,
) -> Result<()> {
    let (config, pool) = open(config_path)?;
    let conn = pool.get()?;
    episodes::require_episode(&conn, episode)?;

    let workspace = EpisodeWorkspace::new(&config.storage.data_dir, episode);
    if staleness::invalidate_stage(&workspace, stage, reason)? {
        println!("Marked {stage} stale for episode {episode}");
    } else {
        println!("{stage} has not run for episode {episode}; nothing to invalidate");
    }
    Ok(())
}

fn check(config_path: Option<&Path>, episode: EpisodeId) -> Result<()> {
    let (config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let report = publish::run_safety_checks(&conn, &config, episode)?;

    for result in &report.results {
        let mark = if result.passed { "✓" } else { "✗" };
        println!("{mark} {}: {}", result.name, result.message);
    }
    if !report.passed() {
        anyhow::bail!("{} safety check(s) failed", report.failures().len());
    }
    Ok(())
}

fn run_publish(
    config_path: Option<&Path>,
    episode: EpisodeId,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    if !dry_run {
        anyhow::bail!("No upload service is configured; rerun with --dry-run");
    }

    let (config, pool) = open(config_path)?;
    let conn = pool.get()?;
    let workspace = EpisodeWorkspace::new(&config.storage.data_dir, episode);
    let outcome = publish::publish_episode(&conn, &config, &workspace, &DryRunUploader, force)?;

    if outcome.skipped {
        println!("Already published as {}", outcome.video_id);
    } else {
        println!("[DRY RUN] Published as {}", outcome.video_id);
    }
    if let Some(url) = outcome.video_url {
        println!("{url}");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration parsed");
    println!("  Data dir: {}", config.storage.data_dir.display());
    println!("  Database: {}", config.storage.db_path.display());
    println!("  Model: {}", config.generation.model);
    println!("  Segment limit: {} chars", config.segmentation.max_chars);
    println!(
        "  Review required: {}",
        config
            .review
            .required_stages
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Budget: ${:.2} per episode", config.budget.max_episode_cost_usd);

    let warnings = config.validate();
    for w in &warnings {
        println!("  ⚠ {w}");
    }
    Ok(())
}
