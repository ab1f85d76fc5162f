use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::error_response;

/// `Json` whose rejections use the gateway's 400 `{"error": ...}` body
/// instead of axum's plain-text 4xx.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(
                    status = %rejection.status(),
                    detail = %rejection.body_text(),
                    "request body rejected"
                );
                Err(error_response(StatusCode::BAD_REQUEST, "Invalid request body"))
            }
        }
    }
}
