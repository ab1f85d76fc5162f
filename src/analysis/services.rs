use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, instrument, warn, Instrument, Span};
use uuid::Uuid;

use crate::{
    analysis::{
        provider::{AnalysisOutcome, AnalysisProvider, AnalysisRequest, ProviderError},
        repo::AnalysisStore,
        repo_types::{AnalysisJob, AnalysisStatus, Settlement},
    },
    config::AiConfig,
    error::{error_response, internal_response, message_response},
    state::AppState,
};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        match self {
            AnalysisError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            AnalysisError::NotFound => message_response(StatusCode::NOT_FOUND, "Not found"),
            AnalysisError::Internal(e) => internal_response(&e),
        }
    }
}

/// How often a failed provider call is repeated before the job fails.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(cfg: &AiConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff: cfg.retry_backoff(),
        }
    }
}

/// A freshly created job plus the task that will settle it.
pub struct Submission {
    pub job: AnalysisJob,
    /// Resolves to the terminal status the task tried to write.
    pub settlement: JoinHandle<AnalysisStatus>,
}

#[derive(Clone)]
pub struct AnalysisDispatcher {
    store: Arc<dyn AnalysisStore>,
    provider: Arc<dyn AnalysisProvider>,
    retry: RetryPolicy,
}

impl FromRef<AppState> for AnalysisDispatcher {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.analyses.clone(),
            state.provider.clone(),
            RetryPolicy::from_config(&state.config.ai),
        )
    }
}

impl AnalysisDispatcher {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        provider: Arc<dyn AnalysisProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
        }
    }

    /// Persists a `processing` job and hands the provider call to a
    /// background task. Never waits for the provider.
    ///
    /// Insert and dispatch run in their own task: once the insert has started,
    /// dropping the returned future still dispatches the job.
    #[instrument(skip(self))]
    pub async fn submit(&self, image_id: &str) -> Result<Submission, AnalysisError> {
        let image_id = image_id.trim();
        if image_id.is_empty() {
            return Err(AnalysisError::Validation("imageId is required".into()));
        }

        let this = self.clone();
        let image_id = image_id.to_string();
        let task = tokio::spawn(
            async move {
                let job = this.store.create(&image_id).await?;
                info!(job_id = %job.id, "analysis job created");
                let settlement = this.dispatch(job.id, AnalysisRequest::for_image(&image_id));
                Ok::<_, anyhow::Error>(Submission { job, settlement })
            }
            .instrument(Span::current()),
        );
        Ok(task.await.context("analysis submit task")??)
    }

    pub async fn get(&self, id: &str) -> Result<AnalysisJob, AnalysisError> {
        let id = Uuid::parse_str(id).map_err(|_| AnalysisError::NotFound)?;
        self.store
            .find(id)
            .await?
            .ok_or(AnalysisError::NotFound)
    }

    fn dispatch(&self, job_id: Uuid, request: AnalysisRequest) -> JoinHandle<AnalysisStatus> {
        let store = self.store.clone();
        let provider = self.provider.clone();
        let retry = self.retry.clone();
        let span = info_span!("analysis_settlement", job_id = %job_id);

        tokio::spawn(
            async move {
                let outcome = call_with_retry(provider, request, &retry).await;
                settle(store.as_ref(), job_id, outcome).await
            }
            .instrument(span),
        )
    }
}

async fn call_with_retry(
    provider: Arc<dyn AnalysisProvider>,
    request: AnalysisRequest,
    retry: &RetryPolicy,
) -> Result<AnalysisOutcome, ProviderError> {
    let mut attempt: u32 = 0;
    loop {
        match call_isolated(provider.clone(), request.clone()).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                warn!(error = %e, attempt, max = retry.max_retries, "provider call failed; retrying");
                tokio::time::sleep(retry.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Runs the provider call in its own task so a panic inside it still ends in
/// a terminal write.
async fn call_isolated(
    provider: Arc<dyn AnalysisProvider>,
    request: AnalysisRequest,
) -> Result<AnalysisOutcome, ProviderError> {
    let handle = tokio::spawn(async move { provider.analyze(&request).await });
    match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(ProviderError::Aborted(join_err.to_string())),
    }
}

async fn settle(
    store: &dyn AnalysisStore,
    job_id: Uuid,
    outcome: Result<AnalysisOutcome, ProviderError>,
) -> AnalysisStatus {
    let settlement = match outcome {
        Ok(outcome) => Settlement::Done {
            result_json: outcome.body,
            overlay_url: outcome.overlay_url,
            duration_ms: outcome.duration_ms.unwrap_or(0),
        },
        Err(e) => {
            warn!(error = %e, "analysis provider failed");
            Settlement::Failed
        }
    };
    let status = settlement.status();

    match store.settle(job_id, &settlement).await {
        Ok(true) => info!(%status, "analysis settled"),
        Ok(false) => warn!(%status, "analysis already settled or missing; write skipped"),
        Err(e) => error!(error = ?e, %status, "failed to persist analysis settlement"),
    }
    status
}

/// Fails jobs that have been `processing` longer than `stale_after`. Such jobs
/// lost their settlement task (restart, or a failed terminal write).
pub async fn sweep_stale(
    store: &dyn AnalysisStore,
    stale_after: Duration,
) -> anyhow::Result<u64> {
    let cutoff = OffsetDateTime::now_utc() - stale_after;
    let failed = store.fail_stale(cutoff).await?;
    if failed > 0 {
        warn!(failed, cutoff = %cutoff, "failed stale analysis jobs");
    }
    Ok(failed)
}

/// Runs [`sweep_stale`] immediately and then every `every`.
pub fn spawn_stale_sweeper(
    store: Arc<dyn AnalysisStore>,
    stale_after: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = sweep_stale(store.as_ref(), stale_after).await {
                    error!(error = ?e, "stale analysis sweep failed");
                }
            }
        }
        .instrument(info_span!("analysis_sweeper")),
    )
}
