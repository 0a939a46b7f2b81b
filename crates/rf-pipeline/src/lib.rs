//! rf-pipeline: the staged content pipeline engine.
//!
//! Turns an ingested transcript into a published video through a fixed
//! sequence of stages. Every stage goes through the same [`StageRunner`]:
//! status and review gates, content-hash caching, run bookkeeping,
//! provenance, and staleness propagation. Generative and media services
//! are external and plugged in through traits ([`GenerativeClient`],
//! [`stages::ImageGenerator`], [`stages::SpeechSynthesizer`],
//! [`stages::VideoRenderer`], [`publish::Uploader`]).

pub mod hashing;
pub mod idempotency;
pub mod ingest;
pub mod json_repair;
pub mod llm;
pub mod prompts;
pub mod provenance;
pub mod publish;
pub mod review;
pub mod runner;
pub mod safety;
pub mod segment;
pub mod stage;
pub mod stages;
pub mod staleness;
pub mod validation;
pub mod workspace;

pub use ingest::ingest_transcript;
pub use llm::{Completion, GenerationParams, GenerativeClient, Usage};
pub use publish::{publish_episode, DryRunUploader, PublishOutcome, Uploader};
pub use runner::{RunOptions, StageOutcome, StageRunner};
pub use safety::{SafetyPipeline, SafetyReport};
pub use stage::{StageContext, StageWork};
pub use workspace::EpisodeWorkspace;
