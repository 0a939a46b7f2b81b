//! Staleness markers: single-use "rerun me" flags in stage directories.
//!
//! A marker's presence forces the next idempotency check for that stage to
//! report stale; the check deletes it. Markers are only written into stage
//! directories that already exist, so a stage the episode has not reached
//! yet is left alone.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rf_core::{Result, Stage};

use crate::workspace::{write_atomic, EpisodeWorkspace};

/// Marker file content. Only presence matters to the gate; the fields are
/// for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleMarker {
    pub invalidated_at: DateTime<Utc>,
    pub invalidated_by: String,
    pub reason: String,
}

impl StaleMarker {
    pub fn new(invalidated_by: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            invalidated_at: Utc::now(),
            invalidated_by: invalidated_by.into(),
            reason: reason.into(),
        }
    }
}

/// Write a marker into `stage`'s directory if it exists.
///
/// Returns whether a marker was written.
pub fn mark_stale(
    workspace: &EpisodeWorkspace,
    stage: Stage,
    marker: &StaleMarker,
) -> Result<bool> {
    if !workspace.stage_dir(stage).is_dir() {
        return Ok(false);
    }
    write_marker(&workspace.stale_marker_path(stage), marker)?;
    Ok(true)
}

/// Mark every direct dependent of `changed` stale.
///
/// Returns the stages that were marked.
pub fn propagate(workspace: &EpisodeWorkspace, changed: Stage, reason: &str) -> Result<Vec<Stage>> {
    let marker = StaleMarker::new(changed.as_str(), reason);
    let mut marked = Vec::new();
    for &dependent in changed.dependents() {
        if mark_stale(workspace, dependent, &marker)? {
            marked.push(dependent);
        }
    }
    if !marked.is_empty() {
        tracing::info!(
            "{changed} output changed; marked stale: {}",
            marked.iter().map(Stage::as_str).collect::<Vec<_>>().join(", ")
        );
    }
    Ok(marked)
}

/// Operator-requested invalidation of a single stage.
pub fn invalidate_stage(workspace: &EpisodeWorkspace, stage: Stage, reason: &str) -> Result<bool> {
    let marked = mark_stale(workspace, stage, &StaleMarker::new("operator", reason))?;
    if marked {
        tracing::info!("Invalidated {stage} for episode {}: {reason}", workspace.episode_id());
    } else {
        tracing::info!(
            "{stage} has not run for episode {}; nothing to invalidate",
            workspace.episode_id()
        );
    }
    Ok(marked)
}

/// Read a marker without consuming it. Unreadable markers still count as
/// present, so the content is optional.
pub fn read_marker(path: &Path) -> Option<StaleMarker> {
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn write_marker(path: &Path, marker: &StaleMarker) -> Result<()> {
    let json = serde_json::to_vec_pretty(marker)?;
    write_atomic(path, &json)
}
