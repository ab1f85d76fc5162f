use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of an analysis job. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Done => "done",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Processing)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(AnalysisStatus::Processing),
            "done" => Ok(AnalysisStatus::Done),
            "failed" => Ok(AnalysisStatus::Failed),
            other => anyhow::bail!("unknown analysis status {other:?}"),
        }
    }
}

/// Job record as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: Uuid,
    pub image_id: String,
    pub status: AnalysisStatus,
    pub result_json: serde_json::Value,
    pub overlay_url: Option<String>,
    pub duration_ms: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AnalysisJob {
    pub fn processing(image_id: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            image_id: image_id.to_string(),
            status: AnalysisStatus::Processing,
            result_json: serde_json::json!({}),
            overlay_url: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a terminal write. Returns `false` if the job already settled.
    pub fn apply(&mut self, settlement: &Settlement) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if let Settlement::Done {
            result_json,
            overlay_url,
            duration_ms,
        } = settlement
        {
            self.result_json = result_json.clone();
            self.overlay_url = overlay_url.clone();
            self.duration_ms = Some(*duration_ms);
        }
        self.status = settlement.status();
        self.updated_at = OffsetDateTime::now_utc();
        true
    }
}

/// Row as stored in `analyses`; status is kept as text.
#[derive(Debug, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub image_id: String,
    pub status: String,
    pub result_json: serde_json::Value,
    pub overlay_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<AnalysisRow> for AnalysisJob {
    type Error = anyhow::Error;

    fn try_from(r: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            image_id: r.image_id,
            status: r.status.parse()?,
            result_json: r.result_json,
            overlay_url: r.overlay_url,
            duration_ms: r.duration_ms,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// The single terminal write for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Done {
        result_json: serde_json::Value,
        overlay_url: Option<String>,
        duration_ms: i64,
    },
    Failed,
}

impl Settlement {
    pub fn status(&self) -> AnalysisStatus {
        match self {
            Settlement::Done { .. } => AnalysisStatus::Done,
            Settlement::Failed => AnalysisStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_text_roundtrips_through_the_row() {
        for status in [
            AnalysisStatus::Processing,
            AnalysisStatus::Done,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
        }
        assert!("queued".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn terminal_state_is_never_left() {
        let mut job = AnalysisJob::processing("img-1");
        assert!(job.apply(&Settlement::Failed));
        let done = Settlement::Done {
            result_json: json!({"teeth": 32}),
            overlay_url: None,
            duration_ms: 1,
        };
        assert!(!job.apply(&done));
        assert_eq!(job.status, AnalysisStatus::Failed);
        assert_eq!(job.result_json, json!({}));
    }

    #[test]
    fn job_serializes_with_camel_case_keys() {
        let job = AnalysisJob::processing("img-42");
        let v = serde_json::to_value(&job).unwrap();
        assert_eq!(v["imageId"], "img-42");
        assert_eq!(v["status"], "processing");
        assert_eq!(v["resultJson"], json!({}));
        assert!(v["overlayUrl"].is_null());
        assert!(v["durationMs"].is_null());
    }
}
