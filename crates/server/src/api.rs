use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use mailsmith_agent::pipeline::{BatchRunner, EditPipeline, InstructionRequest, PipelineOutcome};
use mailsmith_agent::resolver::ResolvedDocument;
use mailsmith_core::domain::document::DocumentId;
use mailsmith_core::domain::message::ConversationId;
use mailsmith_core::errors::{ApplicationError, InterfaceError};

const MAX_BATCH_SIZE: usize = 100;

#[derive(Clone)]
pub struct ApiState {
    pipeline: Arc<EditPipeline>,
    batch: Arc<BatchRunner>,
}

impl ApiState {
    pub fn new(pipeline: Arc<EditPipeline>, batch_concurrency: usize) -> Self {
        let batch = Arc::new(BatchRunner::new(pipeline.clone(), batch_concurrency));
        Self { pipeline, batch }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
    pub retryable: bool,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn reject(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ApiError {
        error: error.user_message().to_string(),
        detail: error.to_string(),
        correlation_id: error.correlation_id().to_string(),
        retryable: error.is_retryable(),
    };
    (status, Json(body))
}

fn with_correlation_id(mut request: InstructionRequest) -> (String, InstructionRequest) {
    let correlation_id = request
        .correlation_id
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.correlation_id = Some(correlation_id.clone());
    (correlation_id, request)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/instructions", post(process_instruction))
        .route("/api/v1/instructions/batch", post(process_batch))
        .route("/api/v1/documents/resolve", get(resolve_document))
        .with_state(state)
}

pub async fn process_instruction(
    State(state): State<ApiState>,
    Json(request): Json<InstructionRequest>,
) -> ApiResult<PipelineOutcome> {
    let (correlation_id, request) = with_correlation_id(request);
    match state.pipeline.process(request).await {
        Ok(outcome) => {
            info!(
                event_name = "api.instruction.done",
                correlation_id = %correlation_id,
                source = ?outcome.source,
                persisted = outcome.persisted,
            );
            Ok(Json(outcome))
        }
        Err(error) => {
            warn!(event_name = "api.instruction.failed", correlation_id = %correlation_id, error = %error);
            Err(reject(ApplicationError::from(error).into_interface(correlation_id)))
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BatchRequest {
    pub instructions: Vec<InstructionRequest>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchItem {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PipelineOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

pub async fn process_batch(
    State(state): State<ApiState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<BatchResponse> {
    let batch_id = Uuid::new_v4().to_string();
    let size = request.instructions.len();
    if size == 0 || size > MAX_BATCH_SIZE {
        return Err(reject(InterfaceError::BadRequest {
            message: format!("batch must contain between 1 and {MAX_BATCH_SIZE} instructions"),
            correlation_id: batch_id,
        }));
    }

    let (correlation_ids, requests): (Vec<String>, Vec<InstructionRequest>) =
        request.instructions.into_iter().map(with_correlation_id).unzip();
    let outcomes = state.batch.run(requests).await;

    let results: Vec<BatchItem> = outcomes
        .into_iter()
        .zip(correlation_ids)
        .map(|(result, correlation_id)| match result {
            Ok(outcome) => BatchItem { status: "ok", outcome: Some(outcome), error: None },
            Err(error) => {
                let (_, Json(body)) =
                    reject(ApplicationError::from(error).into_interface(correlation_id));
                BatchItem { status: "error", outcome: None, error: Some(body) }
            }
        })
        .collect();

    let succeeded = results.iter().filter(|item| item.outcome.is_some()).count();
    info!(event_name = "api.batch.done", batch_id = %batch_id, succeeded, failed = size - succeeded);
    Ok(Json(BatchResponse { succeeded, failed: size - succeeded, results }))
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResolveQuery {
    pub document_id: Option<String>,
    pub conversation_id: Option<String>,
}

pub async fn resolve_document(
    State(state): State<ApiState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<ResolvedDocument> {
    let correlation_id = Uuid::new_v4().to_string();
    let document_id = query.document_id.filter(|id| !id.trim().is_empty()).map(DocumentId);
    let conversation_id =
        query.conversation_id.filter(|id| !id.trim().is_empty()).map(ConversationId);
    if document_id.is_none() && conversation_id.is_none() {
        return Err(reject(InterfaceError::BadRequest {
            message: "document_id or conversation_id is required".to_string(),
            correlation_id,
        }));
    }

    match state.pipeline.resolver().resolve(document_id.as_ref(), conversation_id.as_ref()).await {
        Ok(Some(resolved)) => Ok(Json(resolved)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "No document found for the given identifiers.".to_string(),
                detail: "resolution miss".to_string(),
                correlation_id,
                retryable: false,
            }),
        )),
        Err(error) => Err(reject(InterfaceError::ServiceUnavailable {
            message: error.to_string(),
            retryable: false,
            correlation_id,
        })),
    }
}
