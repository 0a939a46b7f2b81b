//! Identifiers for episodes and the records hanging off them.
//!
//! Runs, artifacts, review tasks, decisions, publish jobs, and prompt versions
//! all reference an episode by UUID. Wrapping each in its own type keeps a
//! review task id from being passed where an episode id is wanted, and the
//! `FromStr` impls let the CLI take ids straight from arguments. Ids are
//! stored as hyphenated text in SQLite.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declare id newtypes over `Uuid`: random `new()`/`Default`, serde as a
/// bare string, `Display`/`FromStr` in hyphenated form, and `Uuid`
/// conversions both ways.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Return the inner UUID value.
                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }

            impl From<$name> for Uuid {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Unique identifier for an episode moving through the pipeline.
    EpisodeId,
    /// Unique identifier for one stage execution attempt.
    PipelineRunId,
    /// Unique identifier for a stage's durable output pointer.
    ArtifactId,
    /// Unique identifier for a human review request.
    ReviewTaskId,
    /// Unique identifier for one entry in a review's decision trail.
    ReviewDecisionId,
    /// Unique identifier for one publish attempt.
    PublishJobId,
    /// Unique identifier for a registered prompt template version.
    PromptVersionId,
}
