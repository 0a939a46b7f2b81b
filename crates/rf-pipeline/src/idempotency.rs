//! Decide whether a stage's cached output can be reused.
//!
//! [`check_freshness`] is the tri-state answer (absent / current / stale with
//! a reason) and never touches the marker. A stale marker in the stage
//! directory always wins; it stays in place until a rerun succeeds and the
//! runner calls [`consume_marker`]. [`is_current`] is the single-use boolean
//! gate for callers without a runner: it consumes the marker it observes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::provenance::Provenance;
use crate::workspace::STALE_MARKER_FILE;

/// Why cached output cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// A stale marker is present.
    Marked,
    /// Provenance is missing or unparseable.
    NoProvenance,
    /// The prompt or recipe hash differs.
    PromptChanged,
    /// One or more input hashes differ.
    InputsChanged,
}

/// State of a stage's cached output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// No output yet.
    Absent,
    /// Output exists and matches the current inputs and prompt.
    Current,
    /// Output exists but must be regenerated.
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_current(&self) -> bool {
        matches!(self, Freshness::Current)
    }
}

/// Where a stage's marker lives for a given output file.
pub fn marker_path_for(output: &Path) -> PathBuf {
    output
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(STALE_MARKER_FILE)
}

/// Full freshness check for a stage output. Read-only.
pub fn check_freshness(
    output: &Path,
    provenance_path: &Path,
    input_hashes: &BTreeMap<String, String>,
    prompt_hash: &str,
) -> Freshness {
    let marked = marker_path_for(output).exists();

    if !output.exists() {
        return Freshness::Absent;
    }
    if marked {
        return Freshness::Stale(StaleReason::Marked);
    }

    let Some(provenance) = Provenance::read(provenance_path) else {
        return Freshness::Stale(StaleReason::NoProvenance);
    };
    if provenance.prompt.hash != prompt_hash {
        tracing::debug!(
            "Prompt hash changed for {}: {} -> {}",
            output.display(),
            provenance.prompt.hash,
            prompt_hash
        );
        return Freshness::Stale(StaleReason::PromptChanged);
    }
    if &provenance.input_hashes != input_hashes {
        tracing::debug!("Input hashes changed for {}", output.display());
        return Freshness::Stale(StaleReason::InputsChanged);
    }
    Freshness::Current
}

/// `true` only when `output` can be reused as is. A marker seen here is
/// consumed, so it forces exactly one `false`.
pub fn is_current(
    output: &Path,
    provenance_path: &Path,
    input_hashes: &BTreeMap<String, String>,
    prompt_hash: &str,
) -> bool {
    let freshness = check_freshness(output, provenance_path, input_hashes, prompt_hash);
    if freshness == Freshness::Stale(StaleReason::Marked) {
        consume_marker(&marker_path_for(output));
    }
    freshness.is_current()
}

/// Delete a marker, reporting whether one was there.
pub fn consume_marker(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Consumed stale marker {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            // Still counts as stale; the marker stays for the next check.
            tracing::warn!("Cannot remove stale marker {}: {e}", path.display());
            true
        }
    }
}
