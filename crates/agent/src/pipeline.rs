//! resolve -> classify -> compile -> llm -> sanitize -> commit.
//!
//! The llm call is the only step under a timeout. A failed or unusable
//! completion is recovered with the deterministic fallback on the create
//! path only; edit and analyze surface a retryable error and write nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use mailsmith_core::classifier::{Classification, OperationClassifier};
use mailsmith_core::compiler::{InstructionCompiler, PromptTemplate, TemperatureProfile};
use mailsmith_core::config::AppConfig;
use mailsmith_core::domain::document::DocumentId;
use mailsmith_core::domain::instruction::{Instruction, Operation};
use mailsmith_core::domain::message::ConversationId;
use mailsmith_core::errors::{ApplicationError, DomainError};
use mailsmith_core::fallback::{FallbackError, FallbackGenerator};
use mailsmith_core::sanitizer::{ResponseSanitizer, SanitizeReport};
use mailsmith_core::deliverability::{assess, DeliverabilityReport};
use mailsmith_core::text::{extract_subject, lint, LintReport};
use mailsmith_db::repositories::{DocumentRepository, MessageLogRepository};

use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::resolver::{ResolveError, ResolvedSource, StateResolver};
use crate::writer::ReconciliationWriter;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidInstruction(#[from] DomainError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("model unavailable for {operation}: {message}")]
    ServiceUnavailable { operation: &'static str, message: String, retryable: bool },
    #[error("fallback generation failed: {0}")]
    Fallback(#[from] FallbackError),
    #[error("batch worker failed: {0}")]
    Worker(String),
}

impl From<PipelineError> for ApplicationError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::InvalidInstruction(error) => Self::Domain(error),
            PipelineError::Resolve(error) => Self::Persistence(error.to_string()),
            PipelineError::ServiceUnavailable { message, retryable, .. } => {
                Self::ServiceUnavailable { message, retryable }
            }
            PipelineError::Fallback(error) => Self::Integration(error.to_string()),
            PipelineError::Worker(message) => Self::Integration(message),
        }
    }
}

/// One instruction plus the storage keys it applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRequest {
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub instruction: Instruction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    Model,
    Fallback,
}

#[derive(Clone, Debug, Serialize)]
pub struct PipelineOutcome {
    pub correlation_id: String,
    pub html: String,
    pub classification: Classification,
    pub template: PromptTemplate,
    pub source: OutcomeSource,
    pub resolved_from: Option<ResolvedSource>,
    pub persisted: bool,
    pub sanitize: SanitizeReport,
    pub lint: LintReport,
    pub deliverability: DeliverabilityReport,
}

pub struct EditPipeline {
    resolver: StateResolver,
    classifier: OperationClassifier,
    compiler: InstructionCompiler,
    sanitizer: ResponseSanitizer,
    fallback: FallbackGenerator,
    writer: ReconciliationWriter,
    llm: Arc<dyn LlmClient>,
    llm_timeout: Duration,
}

impl EditPipeline {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        messages: Arc<dyn MessageLogRepository>,
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            resolver: StateResolver::new(
                documents.clone(),
                messages.clone(),
                config.pipeline.history_limit,
            ),
            classifier: OperationClassifier::new(config.pipeline.min_document_chars),
            compiler: InstructionCompiler::new(TemperatureProfile::from(&config.pipeline)),
            sanitizer: ResponseSanitizer,
            fallback: FallbackGenerator::new()?,
            writer: ReconciliationWriter::new(documents, messages),
            llm,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
        })
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm.is_enabled()
    }

    pub fn resolver(&self) -> &StateResolver {
        &self.resolver
    }

    pub async fn process(&self, request: InstructionRequest) -> Result<PipelineOutcome, PipelineError> {
        let correlation_id =
            request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let instruction = &request.instruction;
        instruction.validate()?;

        let resolved =
            self.resolver.resolve(request.document_id.as_ref(), request.conversation_id.as_ref()).await?;
        let resolved_html = resolved.as_ref().map(|doc| doc.html.as_str());

        let classification = self.classifier.classify(
            &instruction.text,
            resolved_html,
            instruction.declared_operation,
            instruction.target_element.as_ref(),
        );
        info!(
            event_name = "pipeline.classify.done",
            correlation_id = %correlation_id,
            operation = classification.operation.as_str(),
            confidence = classification.confidence,
            rule = ?classification.rule,
            has_existing_document = classification.has_existing_document,
        );

        let base_html = resolved_html.filter(|_| classification.has_existing_document);
        let compiled = self.compiler.compile(
            classification.operation,
            &instruction.text,
            base_html,
            instruction.target_element.as_ref(),
            &instruction.images,
        );

        let completion = self.complete(&CompletionRequest::from(&compiled)).await;
        let model_output = completion.map(|raw| self.sanitizer.sanitize(&raw, &instruction.images));

        let (sanitized, source, subject) = match model_output {
            Ok(sanitized) if sanitized.is_document() => (sanitized, OutcomeSource::Model, None),
            failure => {
                let reason = match failure {
                    Ok(_) => "completion contained no html document".to_string(),
                    Err(error) => error.to_string(),
                };
                if classification.operation != Operation::Create {
                    warn!(
                        event_name = "pipeline.llm.failed",
                        correlation_id = %correlation_id,
                        operation = classification.operation.as_str(),
                        reason = %reason,
                    );
                    return Err(PipelineError::ServiceUnavailable {
                        operation: classification.operation.as_str(),
                        message: reason,
                        retryable: true,
                    });
                }
                warn!(
                    event_name = "pipeline.fallback",
                    correlation_id = %correlation_id,
                    reason = %reason,
                    "serving deterministic fallback"
                );
                let fallback = self.fallback.render(&instruction.text, &instruction.include_urls())?;
                let sanitized = self.sanitizer.sanitize(&fallback.html, &instruction.images);
                (sanitized, OutcomeSource::Fallback, Some(fallback.subject))
            }
        };

        let persisted = self.persist(&request, &sanitized.html, subject.as_deref(), &correlation_id).await;
        let lint = lint(&sanitized.html);
        let subject_line = subject.or_else(|| extract_subject(&sanitized.html)).unwrap_or_default();
        let deliverability = assess(&sanitized.html, &subject_line);

        Ok(PipelineOutcome {
            correlation_id,
            html: sanitized.html,
            classification,
            template: compiled.template,
            source,
            resolved_from: resolved.map(|doc| doc.source),
            persisted,
            sanitize: sanitized.report,
            lint,
            deliverability,
        })
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        match tokio::time::timeout(self.llm_timeout, self.llm.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.llm_timeout.as_secs())),
        }
    }

    /// Persistence failures are logged and reported as `persisted = false`.
    async fn persist(
        &self,
        request: &InstructionRequest,
        html: &str,
        subject: Option<&str>,
        correlation_id: &str,
    ) -> bool {
        let result = match (&request.document_id, &request.conversation_id) {
            (Some(document_id), _) => self.writer.commit(document_id, html, subject).await.map(|_| ()),
            (None, Some(conversation_id)) => {
                self.writer.append_to_log(conversation_id, html).await.map(|_| ())
            }
            (None, None) => return false,
        };

        match result {
            Ok(()) => true,
            Err(write_error) => {
                error!(
                    event_name = "pipeline.persist.failed",
                    correlation_id = %correlation_id,
                    error = %write_error,
                    "returning result without write-back"
                );
                false
            }
        }
    }
}

/// Runs independent instructions with a fixed worker cap. Results come back
/// in input order.
pub struct BatchRunner {
    pipeline: Arc<EditPipeline>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<EditPipeline>, concurrency: usize) -> Self {
        Self { pipeline, concurrency: concurrency.max(1) }
    }

    pub async fn run(
        &self,
        requests: Vec<InstructionRequest>,
    ) -> Vec<Result<PipelineOutcome, PipelineError>> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let total = requests.len();

        for (index, request) in requests.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => pipeline.process(request).await,
                    Err(closed) => Err(PipelineError::Worker(closed.to_string())),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<PipelineOutcome, PipelineError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(join_error) => {
                    error!(event_name = "pipeline.batch.worker_failed", error = %join_error);
                }
            }
        }

        info!(event_name = "pipeline.batch.done", total, concurrency = self.concurrency);
        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(PipelineError::Worker("worker did not report".to_string())))
            })
            .collect()
    }
}
