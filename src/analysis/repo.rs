use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analysis::repo_types::{AnalysisJob, AnalysisRow, Settlement};

/// Job record store.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Inserts a new job in `processing` state with an empty result.
    async fn create(&self, image_id: &str) -> anyhow::Result<AnalysisJob>;
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<AnalysisJob>>;
    /// Moves a `processing` job to its terminal state. Returns `false` when
    /// the job is missing or has already settled; nothing is written then.
    async fn settle(&self, id: Uuid, settlement: &Settlement) -> anyhow::Result<bool>;
    /// Fails every job still `processing` that was created before `cutoff`.
    /// Returns how many jobs were failed.
    async fn fail_stale(&self, cutoff: OffsetDateTime) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgAnalysisStore {
    db: PgPool,
}

impl PgAnalysisStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn create(&self, image_id: &str) -> anyhow::Result<AnalysisJob> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            INSERT INTO analyses (id, image_id, status, result_json)
            VALUES ($1, $2, 'processing', '{}'::jsonb)
            RETURNING id, image_id, status, result_json, overlay_url, duration_ms,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(image_id)
        .fetch_one(&self.db)
        .await
        .context("insert analysis")?;
        row.try_into()
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<AnalysisJob>> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT id, image_id, status, result_json, overlay_url, duration_ms,
                   created_at, updated_at
            FROM analyses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find analysis")?;
        row.map(AnalysisJob::try_from).transpose()
    }

    async fn settle(&self, id: Uuid, settlement: &Settlement) -> anyhow::Result<bool> {
        let result = match settlement {
            Settlement::Done {
                result_json,
                overlay_url,
                duration_ms,
            } => {
                sqlx::query(
                    r#"
                    UPDATE analyses
                       SET status = 'done',
                           result_json = $2,
                           overlay_url = $3,
                           duration_ms = $4,
                           updated_at = now()
                     WHERE id = $1 AND status = 'processing'
                    "#,
                )
                .bind(id)
                .bind(result_json)
                .bind(overlay_url)
                .bind(duration_ms)
                .execute(&self.db)
                .await
            }
            Settlement::Failed => {
                sqlx::query(
                    r#"
                    UPDATE analyses
                       SET status = 'failed',
                           updated_at = now()
                     WHERE id = $1 AND status = 'processing'
                    "#,
                )
                .bind(id)
                .execute(&self.db)
                .await
            }
        }
        .context("settle analysis")?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_stale(&self, cutoff: OffsetDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE analyses
               SET status = 'failed',
                   updated_at = now()
             WHERE status = 'processing' AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await
        .context("fail stale analyses")?;
        Ok(result.rows_affected())
    }
}

/// Process-local job store.
#[derive(Default)]
pub struct MemoryAnalysisStore {
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn jobs(&self) -> Vec<AnalysisJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    #[cfg(test)]
    pub async fn backdate(&self, id: Uuid, by: std::time::Duration) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.created_at -= by;
        }
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn create(&self, image_id: &str) -> anyhow::Result<AnalysisJob> {
        let job = AnalysisJob::processing(image_id);
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<AnalysisJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn settle(&self, id: Uuid, settlement: &Settlement) -> anyhow::Result<bool> {
        Ok(self
            .jobs
            .write()
            .await
            .get_mut(&id)
            .map(|job| job.apply(settlement))
            .unwrap_or(false))
    }

    async fn fail_stale(&self, cutoff: OffsetDateTime) -> anyhow::Result<u64> {
        let mut failed = 0;
        for job in self.jobs.write().await.values_mut() {
            if job.created_at < cutoff && job.apply(&Settlement::Failed) {
                failed += 1;
            }
        }
        Ok(failed)
    }
}
