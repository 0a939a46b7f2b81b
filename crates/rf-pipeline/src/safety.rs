//! Pre-publish safety checks.
//!
//! Every check runs, even after an earlier one fails, so the report lists
//! every problem at once. Publish proceeds only if all of them pass.

use std::path::Path;

use rusqlite::Connection;

use rf_core::config::Config;
use rf_core::{EpisodeStatus, Error, Result, Stage};
use rf_db::models::Episode;
use rf_db::queries::pipeline_runs;

use crate::hashing;
use crate::review;

/// One check's verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.into(),
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Inputs available to every check.
pub struct SafetyContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a Config,
    pub episode: &'a Episode,
    /// A forced publish of an episode that is already `published`.
    pub republish: bool,
}

/// A single independent pre-publish predicate.
pub trait SafetyCheck {
    fn name(&self) -> &'static str;

    /// Evaluate the check. An `Err` is reported as a failed check, not
    /// propagated.
    fn run(&self, ctx: &SafetyContext) -> Result<CheckResult>;
}

/// Results of a full pipeline run, one per check in order.
#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub results: Vec<CheckResult>,
}

impl SafetyReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// Convert failures into one [`Error::SafetyCheck`] naming every failed check.
    pub fn ensure_passed(&self) -> Result<()> {
        if self.passed() {
            return Ok(());
        }
        Err(Error::SafetyCheck {
            failures: self
                .failures()
                .iter()
                .map(|r| format!("{}: {}", r.name, r.message))
                .collect(),
        })
    }
}

/// An ordered list of checks.
pub struct SafetyPipeline {
    checks: Vec<Box<dyn SafetyCheck>>,
}

impl SafetyPipeline {
    pub fn new(checks: Vec<Box<dyn SafetyCheck>>) -> Self {
        Self { checks }
    }

    /// Approval gate, artifact integrity, metadata completeness, cost sanity.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ApprovalGate),
            Box::new(ArtifactIntegrity),
            Box::new(MetadataCompleteness),
            Box::new(CostSanity),
        ])
    }

    /// Run every check.
    pub fn run(&self, ctx: &SafetyContext) -> SafetyReport {
        let results = self
            .checks
            .iter()
            .map(|check| {
                let result = check.run(ctx).unwrap_or_else(|e| {
                    CheckResult::fail(check.name(), format!("check errored: {e}"))
                });
                if result.passed {
                    tracing::debug!("Safety check {} passed: {}", result.name, result.message);
                } else {
                    tracing::warn!("Safety check {} failed: {}", result.name, result.message);
                }
                result
            })
            .collect();
        SafetyReport { results }
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Episode is `approved` (or `published`, when republishing) and its render
/// has an approved review.
pub struct ApprovalGate;

impl SafetyCheck for ApprovalGate {
    fn name(&self) -> &'static str {
        "approval_gate"
    }

    fn run(&self, ctx: &SafetyContext) -> Result<CheckResult> {
        let status_ok = match ctx.episode.status {
            EpisodeStatus::Approved => true,
            EpisodeStatus::Published => ctx.republish,
            _ => false,
        };
        if !status_ok {
            return Ok(CheckResult::fail(
                self.name(),
                format!("episode status is {}, expected approved", ctx.episode.status),
            ));
        }
        match review::latest_approved(ctx.conn, ctx.episode.id, Stage::Render)? {
            Some(task) => Ok(CheckResult::pass(
                self.name(),
                format!("render review {} approved", task.id),
            )),
            None => Ok(CheckResult::fail(self.name(), "no approved render review")),
        }
    }
}

/// Reviewed render files still hash to what was approved.
pub struct ArtifactIntegrity;

impl SafetyCheck for ArtifactIntegrity {
    fn name(&self) -> &'static str {
        "artifact_integrity"
    }

    fn run(&self, ctx: &SafetyContext) -> Result<CheckResult> {
        let Some(task) = review::latest_approved(ctx.conn, ctx.episode.id, Stage::Render)? else {
            return Ok(CheckResult::fail(
                self.name(),
                "no approved render review to verify against",
            ));
        };
        if task.artifact_paths.is_empty() {
            return Ok(CheckResult::fail(self.name(), "approved render review lists no artifacts"));
        }
        if let Some(missing) = task.artifact_paths.iter().find(|p| !Path::new(p).is_file()) {
            return Ok(CheckResult::fail(self.name(), format!("artifact missing: {missing}")));
        }

        let current = hashing::hash_files(&task.artifact_paths)?;
        if current == task.artifact_hash {
            Ok(CheckResult::pass(
                self.name(),
                format!("{} artifact(s) match approved hash", task.artifact_paths.len()),
            ))
        } else {
            Ok(CheckResult::fail(
                self.name(),
                format!(
                    "artifacts changed since approval (approved {}, now {})",
                    short(&task.artifact_hash),
                    short(&current)
                ),
            ))
        }
    }
}

/// Title, description, and tags are present.
pub struct MetadataCompleteness;

impl SafetyCheck for MetadataCompleteness {
    fn name(&self) -> &'static str {
        "metadata_completeness"
    }

    fn run(&self, ctx: &SafetyContext) -> Result<CheckResult> {
        let ep = ctx.episode;
        let mut missing = Vec::new();
        if ep.title.trim().is_empty() {
            missing.push("title");
        }
        if ep.description.trim().is_empty() {
            missing.push("description");
        }
        if ep.tags.iter().all(|t| t.trim().is_empty()) {
            missing.push("tags");
        }

        if missing.is_empty() {
            Ok(CheckResult::pass(self.name(), "title, description, and tags present"))
        } else {
            Ok(CheckResult::fail(self.name(), format!("missing {}", missing.join(", "))))
        }
    }
}

/// Recorded spend does not exceed the episode budget.
pub struct CostSanity;

impl SafetyCheck for CostSanity {
    fn name(&self) -> &'static str {
        "cost_sanity"
    }

    fn run(&self, ctx: &SafetyContext) -> Result<CheckResult> {
        let spent = pipeline_runs::total_cost(ctx.conn, ctx.episode.id)?;
        let budget = ctx.config.budget.max_episode_cost_usd;
        let message = format!("spent ${spent:.4} of ${budget:.4}");
        if spent <= budget {
            Ok(CheckResult::pass(self.name(), message))
        } else {
            Ok(CheckResult::fail(self.name(), message))
        }
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rf_db::pool::init_memory_pool;
    use rf_core::ReviewDecisionKind;
    use rf_db::queries::episodes;

    use super::*;

    struct AlwaysErr;

    impl SafetyCheck for AlwaysErr {
        fn name(&self) -> &'static str {
            "always_err"
        }

        fn run(&self, _ctx: &SafetyContext) -> Result<CheckResult> {
            Err(Error::Internal("boom".into()))
        }
    }

    #[test]
    fn all_checks_report_even_when_all_fail() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = Config::default();
        let ep = episodes::create_episode(&conn, "", "1").unwrap();
        let episode = episodes::require_episode(&conn, ep.id).unwrap();

        let ctx = SafetyContext {
            conn: &conn,
            config: &config,
            episode: &episode,
            republish: false,
        };
        let report = SafetyPipeline::standard().run(&ctx);
        assert_eq!(report.results.len(), 4);

        let names: Vec<_> = report.failures().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["approval_gate", "artifact_integrity", "metadata_completeness"]);

        let err = report.ensure_passed().unwrap_err();
        assert_matches!(err, Error::SafetyCheck { ref failures } if failures.len() == 3);
        assert!(err
            .to_string()
            .contains("metadata_completeness: missing title, description, tags"));
    }

    #[test]
    fn erroring_check_counts_as_failure() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = Config::default();
        let ep = episodes::create_episode(&conn, "t", "1").unwrap();
        let episode = episodes::require_episode(&conn, ep.id).unwrap();
        let ctx = SafetyContext {
            conn: &conn,
            config: &config,
            episode: &episode,
            republish: false,
        };

        let report = SafetyPipeline::new(vec![Box::new(AlwaysErr), Box::new(CostSanity)]).run(&ctx);
        assert_eq!(report.results.len(), 2);
        assert!(!report.results[0].passed);
        assert!(report.results[0].message.contains("boom"));
        assert!(report.results[1].passed);
    }

    #[test]
    fn published_episode_passes_gate_only_when_republishing() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = Config::default();
        let ep = episodes::create_episode(&conn, "t", "1").unwrap();
        episodes::set_status(&conn, ep.id, EpisodeStatus::Rendered).unwrap();
        let task = review::open_review(&conn, ep.id, Stage::Render, &[], "h", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        review::decide_review(&conn, dir.path(), task.id, ReviewDecisionKind::Approved, "ana", None)
            .unwrap();
        episodes::mark_published(&conn, ep.id, "v1", "https://videos.example/v1").unwrap();
        let episode = episodes::require_episode(&conn, ep.id).unwrap();

        let mut ctx = SafetyContext {
            conn: &conn,
            config: &config,
            episode: &episode,
            republish: false,
        };
        let result = ApprovalGate.run(&ctx).unwrap();
        assert!(!result.passed);
        assert!(result.message.contains("published"));

        ctx.republish = true;
        assert!(ApprovalGate.run(&ctx).unwrap().passed);
    }

    #[test]
    fn cost_over_budget_fails() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut config = Config::default();
        config.budget.max_episode_cost_usd = 1.0;
        let ep = episodes::create_episode(&conn, "t", "1").unwrap();
        let run = pipeline_runs::start_run(&conn, ep.id, Stage::Correct).unwrap();
        pipeline_runs::complete_run(&conn, run.id, 1, 1, 1.5).unwrap();

        let episode = episodes::require_episode(&conn, ep.id).unwrap();
        let ctx = SafetyContext {
            conn: &conn,
            config: &config,
            episode: &episode,
            republish: false,
        };
        let result = CostSanity.run(&ctx).unwrap();
        assert!(!result.passed);
        assert_eq!(result.message, "spent $1.5000 of $1.0000");
    }
}
