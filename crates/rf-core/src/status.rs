//! Lifecycle enums for episodes, stage runs, reviews, and publish jobs.
//!
//! All enums serialize in snake_case and round-trip through their database
//! text form via `Display`/`FromStr`. The stage graph (which status a stage
//! requires, which it produces, and which stages consume its output) is
//! defined once here on [`Stage`] so that adding a stage cannot silently
//! permit an invalid transition elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generate `as_str`, `Display`, and `FromStr` for a fieldless enum whose
/// text form is fixed.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The canonical text form stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", $label, s)),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// EpisodeStatus
// ---------------------------------------------------------------------------

/// Where an episode sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    New,
    Transcribed,
    Corrected,
    Translated,
    Adapted,
    Chapterized,
    ImagesGenerated,
    TtsDone,
    Rendered,
    Approved,
    Published,
    /// The episode's spend exceeded its budget; only a forced run proceeds.
    CostLimit,
}

text_enum!(EpisodeStatus, "episode status", {
    New => "new",
    Transcribed => "transcribed",
    Corrected => "corrected",
    Translated => "translated",
    Adapted => "adapted",
    Chapterized => "chapterized",
    ImagesGenerated => "images_generated",
    TtsDone => "tts_done",
    Rendered => "rendered",
    Approved => "approved",
    Published => "published",
    CostLimit => "cost_limit",
});

impl EpisodeStatus {
    /// Position on the linear progression, or `None` for `cost_limit`.
    pub fn rank(&self) -> Option<u8> {
        let rank = match self {
            Self::New => 0,
            Self::Transcribed => 1,
            Self::Corrected => 2,
            Self::Translated => 3,
            Self::Adapted => 4,
            Self::Chapterized => 5,
            Self::ImagesGenerated => 6,
            Self::TtsDone => 7,
            Self::Rendered => 8,
            Self::Approved => 9,
            Self::Published => 10,
            Self::CostLimit => return None,
        };
        Some(rank)
    }

    /// Whether `self` is strictly further along than `other`.
    pub fn is_past(&self, other: EpisodeStatus) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A named step of the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Correct,
    Translate,
    Adapt,
    Chapterize,
    Images,
    Tts,
    Render,
}

text_enum!(Stage, "stage", {
    Correct => "correct",
    Translate => "translate",
    Adapt => "adapt",
    Chapterize => "chapterize",
    Images => "images",
    Tts => "tts",
    Render => "render",
});

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Correct,
        Stage::Translate,
        Stage::Adapt,
        Stage::Chapterize,
        Stage::Images,
        Stage::Tts,
        Stage::Render,
    ];

    /// The episode status a run of this stage requires.
    pub fn required_status(&self) -> EpisodeStatus {
        match self {
            Self::Correct => EpisodeStatus::Transcribed,
            Self::Translate => EpisodeStatus::Corrected,
            Self::Adapt => EpisodeStatus::Translated,
            Self::Chapterize => EpisodeStatus::Adapted,
            Self::Images => EpisodeStatus::Chapterized,
            Self::Tts => EpisodeStatus::ImagesGenerated,
            Self::Render => EpisodeStatus::TtsDone,
        }
    }

    /// The episode status after a successful run.
    pub fn target_status(&self) -> EpisodeStatus {
        match self {
            Self::Correct => EpisodeStatus::Corrected,
            Self::Translate => EpisodeStatus::Translated,
            Self::Adapt => EpisodeStatus::Adapted,
            Self::Chapterize => EpisodeStatus::Chapterized,
            Self::Images => EpisodeStatus::ImagesGenerated,
            Self::Tts => EpisodeStatus::TtsDone,
            Self::Render => EpisodeStatus::Rendered,
        }
    }

    /// The stage immediately before this one, whose review gates it.
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Self::Correct => None,
            Self::Translate => Some(Self::Correct),
            Self::Adapt => Some(Self::Translate),
            Self::Chapterize => Some(Self::Adapt),
            Self::Images => Some(Self::Chapterize),
            Self::Tts => Some(Self::Images),
            Self::Render => Some(Self::Tts),
        }
    }

    /// Stages that read this stage's output directly.
    pub fn dependents(&self) -> &'static [Stage] {
        match self {
            Self::Correct => &[Self::Translate],
            Self::Translate => &[Self::Adapt],
            Self::Adapt => &[Self::Chapterize],
            Self::Chapterize => &[Self::Images, Self::Tts, Self::Render],
            Self::Images => &[Self::Render],
            Self::Tts => &[Self::Render],
            Self::Render => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Status of one stage execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

text_enum!(RunStatus, "run status", {
    Running => "running",
    Success => "success",
    Failed => "failed",
});

// ---------------------------------------------------------------------------
// ReviewStatus
// ---------------------------------------------------------------------------

/// Status of a human review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    ChangesRequested,
}

text_enum!(ReviewStatus, "review status", {
    Pending => "pending",
    InReview => "in_review",
    Approved => "approved",
    Rejected => "rejected",
    ChangesRequested => "changes_requested",
});

impl ReviewStatus {
    /// Open tasks block the next stage until decided.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InReview)
    }
}

/// A reviewer's terminal verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecisionKind {
    Approved,
    Rejected,
    ChangesRequested,
}

text_enum!(ReviewDecisionKind, "review decision", {
    Approved => "approved",
    Rejected => "rejected",
    ChangesRequested => "changes_requested",
});

impl From<ReviewDecisionKind> for ReviewStatus {
    fn from(kind: ReviewDecisionKind) -> Self {
        match kind {
            ReviewDecisionKind::Approved => ReviewStatus::Approved,
            ReviewDecisionKind::Rejected => ReviewStatus::Rejected,
            ReviewDecisionKind::ChangesRequested => ReviewStatus::ChangesRequested,
        }
    }
}

// ---------------------------------------------------------------------------
// PublishStatus
// ---------------------------------------------------------------------------

/// Status of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Pending,
    Uploading,
    Published,
    Failed,
}

text_enum!(PublishStatus, "publish status", {
    Pending => "pending",
    Uploading => "uploading",
    Published => "published",
    Failed => "failed",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_chain_statuses() {
        for pair in Stage::ALL.windows(2) {
            assert_eq!(pair[0].target_status(), pair[1].required_status());
            assert_eq!(pair[1].previous(), Some(pair[0]));
        }
        assert_eq!(Stage::Correct.previous(), None);
    }

    #[test]
    fn target_is_one_step_past_required() {
        for stage in Stage::ALL {
            let req = stage.required_status().rank().unwrap();
            let tgt = stage.target_status().rank().unwrap();
            assert_eq!(tgt, req + 1, "{stage}");
        }
    }

    #[test]
    fn dependents_are_downstream() {
        for stage in Stage::ALL {
            for dep in stage.dependents() {
                assert!(dep > &stage, "{dep} should come after {stage}");
            }
        }
    }

    #[test]
    fn status_text_roundtrip() {
        for s in [
            EpisodeStatus::New,
            EpisodeStatus::ImagesGenerated,
            EpisodeStatus::TtsDone,
            EpisodeStatus::CostLimit,
        ] {
            assert_eq!(s.as_str().parse::<EpisodeStatus>().unwrap(), s);
        }
        assert!("bogus".parse::<EpisodeStatus>().is_err());
    }

    #[test]
    fn serde_matches_text_form() {
        let json = serde_json::to_string(&EpisodeStatus::ImagesGenerated).unwrap();
        assert_eq!(json, "\"images_generated\"");
        let json = serde_json::to_string(&ReviewStatus::ChangesRequested).unwrap();
        assert_eq!(json, "\"changes_requested\"");
    }

    #[test]
    fn cost_limit_has_no_rank() {
        assert!(EpisodeStatus::CostLimit.rank().is_none());
        assert!(!EpisodeStatus::CostLimit.is_past(EpisodeStatus::New));
        assert!(EpisodeStatus::Rendered.is_past(EpisodeStatus::Adapted));
    }

    #[test]
    fn open_review_states() {
        assert!(ReviewStatus::Pending.is_open());
        assert!(ReviewStatus::InReview.is_open());
        assert!(!ReviewStatus::Approved.is_open());
        assert_eq!(
            ReviewStatus::from(ReviewDecisionKind::ChangesRequested),
            ReviewStatus::ChangesRequested
        );
    }
}
