//! Orchestration for the email editing pipeline.
//!
//! - `resolver` finds the current html across the primary store and the
//!   conversation log.
//! - `llm` talks to an OpenAI-compatible chat-completions provider.
//! - `writer` persists sanitized html back to storage.
//! - `pipeline` chains resolve, classify, compile, complete, sanitize and
//!   commit for single instructions and bounded batches.
//!
//! The model only ever produces html. Which operation runs, which template is
//! used and what gets persisted are decided deterministically here and in
//! `mailsmith-core`.

pub mod llm;
pub mod pipeline;
pub mod resolver;
pub mod writer;

pub use llm::{CompletionRequest, DisabledLlmClient, LlmClient, LlmError, OpenAiCompatibleClient};
pub use pipeline::{
    BatchRunner, EditPipeline, InstructionRequest, OutcomeSource, PipelineError, PipelineOutcome,
};
pub use resolver::{ResolveError, ResolvedDocument, ResolvedSource, StateResolver};
pub use writer::{ReconciliationWriter, WriteError};
