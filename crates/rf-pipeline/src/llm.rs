//! Contract for the external generative text service.
//!
//! The pipeline never talks to a concrete provider. Callers hand a
//! [`GenerativeClient`] to the stage runner; the runner only counts tokens
//! and cost from what it returns.

use serde::{Deserialize, Serialize};

use rf_core::config::GenerationConfig;
use rf_core::Result;

/// Model parameters sent with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// One response from the generative service.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// A blocking generative text service.
///
/// Transport or provider failures should come back as
/// [`rf_core::Error::Service`]. There is no built-in timeout; implementors
/// that need one impose it on their own requests.
pub trait GenerativeClient: Send + Sync {
    /// Send a system prompt and user message, returning the raw reply.
    fn call(&self, system: &str, user: &str, params: &GenerationParams) -> Result<Completion>;
}

/// Running total of tokens and cost across the calls of one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    /// Add one completion's counters.
    pub fn record(&mut self, completion: &Completion) {
        self.calls += 1;
        self.input_tokens += completion.input_tokens;
        self.output_tokens += completion.output_tokens;
        self.cost_usd += completion.cost_usd;
    }

    /// Count one non-text service call (image, speech, render).
    pub fn record_cost(&mut self, cost_usd: f64) {
        self.calls += 1;
        self.cost_usd += cost_usd;
    }

    /// Fold another usage total into this one.
    pub fn absorb(&mut self, other: Usage) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost_usd += other.cost_usd;
    }
}
