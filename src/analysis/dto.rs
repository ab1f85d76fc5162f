use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::AnalysisStatus;

/// Request body for `POST /v1/analysis`.
#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisRequest {
    #[serde(rename = "imageId")]
    pub image_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnalysisResponse {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
}
