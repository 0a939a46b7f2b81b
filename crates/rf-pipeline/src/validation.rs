//! Validate-and-correct protocol for structured generative output.
//!
//! A reply is parsed (leniently) and checked against an [`OutputSchema`].
//! The first invalid reply earns exactly one corrective call through
//! [`retry_with_correction`]; if that reply is also invalid the error
//! propagates.

use serde::de::DeserializeOwned;

use rf_core::{Error, Result, Stage};

use crate::json_repair::parse_lenient;
use crate::llm::{GenerationParams, GenerativeClient, Usage};

/// Structural invariants every corrective prompt restates.
pub const DEFAULT_CHECKLIST: &[&str] = &[
    "Respond with one valid JSON document and nothing else (no prose, no code fences).",
    "Every identifier is unique.",
    "Numbered items are sequential, starting at 1, in document order.",
    "Aggregate totals equal the sum of their parts.",
];

/// A JSON shape the generative service must produce.
pub trait OutputSchema: DeserializeOwned {
    /// Invariants serde cannot express. `Err` carries a description the model
    /// can act on.
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Checklist lines for the corrective prompt.
    fn checklist() -> &'static [&'static str] {
        DEFAULT_CHECKLIST
    }
}

/// Why a reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOutput {
    /// Not JSON, even after cleanup.
    Unparseable(String),
    /// JSON of the wrong shape, or failing [`OutputSchema::check`].
    Schema(String),
}

impl InvalidOutput {
    pub fn description(&self) -> &str {
        match self {
            Self::Unparseable(msg) | Self::Schema(msg) => msg,
        }
    }

    fn into_error(self, stage: Stage) -> Error {
        match self {
            Self::Unparseable(msg) => Error::Parse(msg),
            Self::Schema(msg) => Error::output_validation(stage.as_str(), msg),
        }
    }
}

/// Result of validating one reply.
#[derive(Debug)]
pub enum ValidationOutcome<T> {
    Valid(T),
    Invalid(InvalidOutput),
}

/// Parse and check one reply.
pub fn validate<T: OutputSchema>(text: &str) -> ValidationOutcome<T> {
    let value = match parse_lenient(text) {
        Ok(v) => v,
        Err(e) => return ValidationOutcome::Invalid(InvalidOutput::Unparseable(e.to_string())),
    };
    let doc: T = match serde_json::from_value(value) {
        Ok(d) => d,
        Err(e) => return ValidationOutcome::Invalid(InvalidOutput::Schema(e.to_string())),
    };
    match doc.check() {
        Ok(()) => ValidationOutcome::Valid(doc),
        Err(msg) => ValidationOutcome::Invalid(InvalidOutput::Schema(msg)),
    }
}

/// Build the user message for the corrective call.
pub fn corrective_message(
    error: &InvalidOutput,
    checklist: &[&str],
    original_input: &str,
) -> String {
    let mut msg = String::from("Your previous response was rejected.\n\n");
    msg.push_str("Problem: ");
    msg.push_str(error.description());
    msg.push_str("\n\nBefore answering again, verify that:\n");
    for item in checklist {
        msg.push_str("- ");
        msg.push_str(item);
        msg.push('\n');
    }
    msg.push_str("\nProcess the original input again:\n\n");
    msg.push_str(original_input);
    msg
}

/// Call the service and validate the reply, correcting once on failure.
///
/// Every call's tokens and cost land in `usage`, including calls whose
/// reply is rejected. Service errors propagate untouched.
pub fn call_validated<T: OutputSchema>(
    client: &dyn GenerativeClient,
    stage: Stage,
    system: &str,
    user: &str,
    params: &GenerationParams,
    usage: &mut Usage,
) -> Result<T> {
    let first = client.call(system, user, params)?;
    usage.record(&first);

    match validate::<T>(&first.text) {
        ValidationOutcome::Valid(doc) => Ok(doc),
        ValidationOutcome::Invalid(error) => {
            tracing::warn!(
                "{stage}: output rejected ({}); retrying with correction",
                error.description()
            );
            retry_with_correction(client, stage, system, user, &error, params, usage)
        }
    }
}

/// The single corrective attempt. An invalid reply here is final.
pub fn retry_with_correction<T: OutputSchema>(
    client: &dyn GenerativeClient,
    stage: Stage,
    system: &str,
    original_input: &str,
    error: &InvalidOutput,
    params: &GenerationParams,
    usage: &mut Usage,
) -> Result<T> {
    let message = corrective_message(error, T::checklist(), original_input);
    let second = client.call(system, &message, params)?;
    usage.record(&second);

    match validate::<T>(&second.text) {
        ValidationOutcome::Valid(doc) => Ok(doc),
        ValidationOutcome::Invalid(error) => {
            tracing::error!("{stage}: corrected output still invalid: {}", error.description());
            Err(error.into_error(stage))
        }
    }
}
