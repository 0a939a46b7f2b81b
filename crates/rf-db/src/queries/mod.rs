//! Database query modules.

pub mod artifacts;
pub mod episodes;
pub mod pipeline_runs;
pub mod prompt_versions;
pub mod publish_jobs;
pub mod review_tasks;
