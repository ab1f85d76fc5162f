//! Placeholder upload URLs. Nothing is signed and no object store is touched.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{config::StorageConfig, state::AppState};

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub url: String,
    pub key: String,
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/uploads/:id", get(upload_url))
}

#[instrument(skip(state))]
pub async fn upload_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<UploadUrlResponse> {
    let key = generate_key();
    let url = placeholder_url(&state.config.storage, &key);
    debug!(%key, "issued placeholder upload url");
    Json(UploadUrlResponse { url, key })
}

/// `u/<16 hex chars>/raw.jpg`
pub fn generate_key() -> String {
    format!("u/{}/raw.jpg", hex::encode(rand::random::<[u8; 8]>()))
}

pub fn placeholder_url(cfg: &StorageConfig, key: &str) -> String {
    format!("{}/{}/{}", cfg.public_url, cfg.bucket, key)
}
