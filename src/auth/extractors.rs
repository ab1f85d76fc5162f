use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::{claims::Identity, jwt::JwtKeys};
use crate::error::error_response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    #[error("No token provided")]
    Unauthenticated,
    #[error("Invalid token")]
    Forbidden,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let status = match self {
            GateRejection::Unauthenticated => StatusCode::UNAUTHORIZED,
            GateRejection::Forbidden => StatusCode::FORBIDDEN,
        };
        error_response(status, self.to_string())
    }
}

/// Extracts and validates the bearer token, yielding the caller identity.
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(GateRejection::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            GateRejection::Forbidden
        })?;

        Ok(AuthUser(claims.into()))
    }
}
