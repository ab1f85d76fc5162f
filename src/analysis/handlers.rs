use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    analysis::{
        dto::{SubmitAnalysisRequest, SubmitAnalysisResponse},
        repo_types::AnalysisJob,
        services::{AnalysisDispatcher, AnalysisError},
    },
    extract::JsonBody,
    state::AppState,
};

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/analysis", post(submit_analysis))
        .route("/v1/analysis/:id", get(get_analysis))
}

/// 202 as soon as the job row exists; the provider call runs detached.
#[instrument(skip(dispatcher, payload))]
pub async fn submit_analysis(
    State(dispatcher): State<AnalysisDispatcher>,
    JsonBody(payload): JsonBody<SubmitAnalysisRequest>,
) -> Result<(StatusCode, Json<SubmitAnalysisResponse>), AnalysisError> {
    let submission = dispatcher
        .submit(payload.image_id.as_deref().unwrap_or_default())
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAnalysisResponse {
            analysis_id: submission.job.id,
            status: submission.job.status,
        }),
    ))
}

#[instrument(skip(dispatcher))]
pub async fn get_analysis(
    State(dispatcher): State<AnalysisDispatcher>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisJob>, AnalysisError> {
    Ok(Json(dispatcher.get(&id).await?))
}
