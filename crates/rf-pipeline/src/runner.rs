//! Stage runner: the shared protocol every stage goes through.
//!
//! 1. Episode status and review gates are checked; nothing is written if
//!    they fail.
//! 2. Input files and the recipe are hashed. If the cached output is current
//!    the run is skipped without a service call or run record.
//! 3. Otherwise a `running` PipelineRun is inserted, the stage body runs, and
//!    the outcome is committed: on success the run, artifacts, status change,
//!    and review task land in one transaction; on failure the run is marked
//!    failed, the episode error is set, and the status is left alone.
//! 4. If the output changed, dependent stages are marked stale. The stage's
//!    own stale marker is removed only after the success commit, so a failed
//!    or refused rerun leaves it for the next attempt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::Connection;
use serde_json::Value;

use rf_core::config::Config;
use rf_core::{
    EpisodeId, EpisodeStatus, Error, PipelineRunId, Result, ReviewStatus, ReviewTaskId, Stage,
};
use rf_db::models::Episode;
use rf_db::queries::{artifacts, episodes, pipeline_runs, review_tasks};

use crate::hashing;
use crate::idempotency::{check_freshness, consume_marker, marker_path_for, Freshness};
use crate::llm::Usage;
use crate::prompts;
use crate::provenance::Provenance;
use crate::review;
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::staleness;
use crate::workspace::EpisodeWorkspace;

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Run even if the episode is not in the stage's required status, or is
    /// over budget.
    pub force: bool,
    /// Regenerate even if the cached output is current.
    pub ignore_cache: bool,
}

/// What a stage invocation did.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    /// `true` when the cached output was reused.
    pub skipped: bool,
    /// Stage summary, from this run or from the cached provenance.
    pub summary: Value,
    pub usage: Usage,
    pub run_id: Option<PipelineRunId>,
    pub output_hash: String,
    pub review_task_id: Option<ReviewTaskId>,
    /// Dependent stages marked stale by this run.
    pub invalidated: Vec<Stage>,
}

/// Runs stages for episodes against one database connection and config.
pub struct StageRunner<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> StageRunner<'a> {
    pub fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    /// Run one stage for the episode owning `workspace`.
    pub fn run(
        &self,
        workspace: &EpisodeWorkspace,
        work: &dyn StageWork,
        options: RunOptions,
    ) -> Result<StageOutcome> {
        let stage = work.stage();
        let episode = episodes::require_episode(self.conn, workspace.episode_id())?;
        let required = stage.required_status();
        let exact = episode.status == required;

        if !options.force && !exact && !episode.status.is_past(required) {
            return Err(Error::precondition(format!(
                "{stage} requires episode status {required}, but episode {} is {}",
                episode.id, episode.status
            )));
        }

        if let Some(previous) = stage.previous() {
            if self.config.requires_review(previous) {
                review::ensure_stage_approved(self.conn, episode.id, previous)?;
            }
        }

        let ctx = StageContext {
            config: self.config,
            workspace,
            episode: &episode,
        };
        work.validate(&ctx)?;
        let recipe = work.recipe(&ctx)?;

        let outputs = work.outputs(workspace);
        let primary = outputs
            .first()
            .ok_or_else(|| Error::Internal(format!("{stage} declares no outputs")))?;
        let inputs = work.inputs(workspace);
        let input_hashes = hash_inputs(workspace, &inputs)?;
        let provenance_path = workspace.provenance_path(stage);

        // Past this stage without force: only a cached result can be returned.
        let rerun_blocked = !options.force && !exact;
        if rerun_blocked && marker_path_for(primary).exists() {
            return Err(Error::precondition(format!(
                "{stage} output is marked stale but episode {} is already {}; rerun with force",
                episode.id, episode.status
            )));
        }

        if !options.ignore_cache {
            let freshness =
                check_freshness(primary, &provenance_path, &input_hashes, &recipe.prompt.hash);
            match freshness {
                Freshness::Current => {
                    return self.skip(workspace, stage, &episode, &provenance_path)
                }
                other => tracing::debug!("{stage} for episode {}: {other:?}", episode.id),
            }
        }

        if rerun_blocked {
            return Err(Error::precondition(format!(
                "{stage} output is out of date but episode {} is already {}; rerun with force",
                episode.id, episode.status
            )));
        }

        if self.config.requires_review(stage) {
            review::ensure_no_open_review(self.conn, episode.id, stage)?;
        }
        if !options.force {
            self.check_budget(&episode)?;
        }

        self.execute(
            &ctx,
            work,
            &recipe,
            ExecutionPlan {
                inputs,
                input_hashes,
                outputs,
                provenance_path,
            },
        )
    }

    /// Refuse to spend more once the episode's recorded cost reaches budget.
    fn check_budget(&self, episode: &Episode) -> Result<()> {
        let spent = pipeline_runs::total_cost(self.conn, episode.id)?;
        let budget = self.config.budget.max_episode_cost_usd;
        if spent < budget {
            return Ok(());
        }

        let err = Error::CostLimit {
            spent_usd: spent,
            budget_usd: budget,
        };
        tracing::warn!("Episode {}: {err}", episode.id);
        episodes::set_status_with_error(
            self.conn,
            episode.id,
            EpisodeStatus::CostLimit,
            &err.to_string(),
        )?;
        Err(err)
    }

    fn skip(
        &self,
        workspace: &EpisodeWorkspace,
        stage: Stage,
        episode: &Episode,
        provenance_path: &Path,
    ) -> Result<StageOutcome> {
        let provenance = Provenance::read(provenance_path)
            .ok_or_else(|| Error::Internal(format!("{stage} provenance vanished during skip")))?;

        let mut review_task_id = None;
        if episode.status == stage.required_status() {
            // Output was produced but the status change never landed.
            let tx = self
                .conn
                .unchecked_transaction()
                .map_err(|e| Error::database(e.to_string()))?;
            episodes::transition_status(
                &tx,
                episode.id,
                stage.required_status(),
                stage.target_status(),
            )?;
            // A rejected or changes-requested task does not cover this output.
            let needs_review = self.config.requires_review(stage)
                && review_tasks::latest_task_for_stage(&tx, episode.id, stage)?
                    .is_none_or(|t| !t.status.is_open() && t.status != ReviewStatus::Approved);
            if needs_review {
                let paths = path_strings(&provenance.output_files);
                let task = review::open_review(
                    &tx,
                    episode.id,
                    stage,
                    &paths,
                    &provenance.output_hash,
                    None,
                )?;
                review_task_id = Some(task.id);
            }
            tx.commit().map_err(|e| Error::database(e.to_string()))?;
        }

        tracing::info!(
            "Skipping {stage} for episode {}: output is current",
            workspace.episode_id()
        );
        Ok(StageOutcome {
            stage,
            skipped: true,
            summary: provenance.summary,
            usage: Usage::default(),
            run_id: None,
            output_hash: provenance.output_hash,
            review_task_id,
            invalidated: Vec::new(),
        })
    }

    fn execute(
        &self,
        ctx: &StageContext,
        work: &dyn StageWork,
        recipe: &Recipe,
        plan: ExecutionPlan,
    ) -> Result<StageOutcome> {
        let stage = work.stage();
        let episode_id = ctx.episode.id;

        ctx.workspace.ensure_stage_dir(stage)?;
        if let Some(template) = &recipe.template {
            prompts::register_template(self.conn, template)?;
        }

        let run = pipeline_runs::start_run(self.conn, episode_id, stage)?;
        tracing::info!("Running {stage} for episode {episode_id}");

        let started = Instant::now();
        let mut usage = Usage::default();
        let result = work.execute(ctx, recipe, &mut usage).and_then(|report| {
            self.commit_success(ctx, stage, recipe, &plan, run.id, &usage, started, report)
        });

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.record_failure(episode_id, stage, run.id, &usage, &e);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_success(
        &self,
        ctx: &StageContext,
        stage: Stage,
        recipe: &Recipe,
        plan: &ExecutionPlan,
        run_id: PipelineRunId,
        usage: &Usage,
        started: Instant,
        report: StageReport,
    ) -> Result<StageOutcome> {
        let episode_id = ctx.episode.id;
        let output_hash = hashing::hash_files(&plan.outputs)?;
        let previous_hash = Provenance::read(&plan.provenance_path).map(|p| p.output_hash);

        let mut provenance = Provenance::new(stage, episode_id);
        provenance.prompt = recipe.prompt.clone();
        provenance.model = recipe.model.clone();
        provenance.parameters = recipe.parameters.clone();
        provenance.input_files = plan.inputs.clone();
        provenance.input_hashes = plan.input_hashes.clone();
        provenance.output_files = plan.outputs.clone();
        provenance.output_hash = output_hash.clone();
        provenance.elapsed_seconds = started.elapsed().as_secs_f64();
        provenance.summary = report.summary.clone();
        let provenance = provenance.with_usage(usage);
        provenance.write(&plan.provenance_path)?;

        let output_paths = path_strings(&plan.outputs);
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;
        pipeline_runs::complete_run(
            &tx,
            run_id,
            usage.input_tokens,
            usage.output_tokens,
            usage.cost_usd,
        )?;
        for path in &output_paths {
            artifacts::create_artifact(
                &tx,
                episode_id,
                stage,
                path,
                &recipe.model,
                &recipe.prompt.hash,
            )?;
        }
        if let Some(meta) = &report.metadata {
            episodes::update_metadata(&tx, episode_id, &meta.title, &meta.description, &meta.tags)?;
        }
        episodes::set_status(&tx, episode_id, stage.target_status())?;
        let review_task_id = if self.config.requires_review(stage) {
            let task =
                review::open_review(&tx, episode_id, stage, &output_paths, &output_hash, None)?;
            Some(task.id)
        } else {
            None
        };
        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        if let Some(primary) = plan.outputs.first() {
            consume_marker(&marker_path_for(primary));
        }

        let invalidated = if previous_hash.as_deref() == Some(output_hash.as_str()) {
            Vec::new()
        } else {
            staleness::propagate(ctx.workspace, stage, &format!("{stage} output changed"))
                .unwrap_or_else(|e| {
                    tracing::warn!("Could not mark stages after {stage} stale: {e}");
                    Vec::new()
                })
        };

        tracing::info!(
            "Finished {stage} for episode {episode_id}: {} calls, {} in / {} out tokens, ${:.4}",
            usage.calls,
            usage.input_tokens,
            usage.output_tokens,
            usage.cost_usd
        );

        Ok(StageOutcome {
            stage,
            skipped: false,
            summary: report.summary,
            usage: *usage,
            run_id: Some(run_id),
            output_hash,
            review_task_id,
            invalidated,
        })
    }

    fn record_failure(
        &self,
        episode_id: EpisodeId,
        stage: Stage,
        run_id: PipelineRunId,
        usage: &Usage,
        err: &Error,
    ) {
        tracing::error!("{stage} failed for episode {episode_id}: {err}");
        let message = err.to_string();
        if let Err(e) = pipeline_runs::fail_run(
            self.conn,
            run_id,
            &message,
            usage.input_tokens,
            usage.output_tokens,
            usage.cost_usd,
        ) {
            tracing::warn!("Could not mark run {run_id} failed: {e}");
        }
        if let Err(e) = episodes::set_error(self.conn, episode_id, &format!("{stage}: {message}")) {
            tracing::warn!("Could not record error on episode {episode_id}: {e}");
        }
    }
}

/// File sets resolved before the stage body runs.
struct ExecutionPlan {
    inputs: Vec<PathBuf>,
    input_hashes: BTreeMap<String, String>,
    outputs: Vec<PathBuf>,
    provenance_path: PathBuf,
}

/// Hash each input, keyed by its path relative to the episode root.
fn hash_inputs(
    workspace: &EpisodeWorkspace,
    inputs: &[PathBuf],
) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for path in inputs {
        let key = path
            .strip_prefix(workspace.root())
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        hashes.insert(key, hashing::hash_file(path)?);
    }
    Ok(hashes)
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.to_string_lossy().into_owned()).collect()
}
