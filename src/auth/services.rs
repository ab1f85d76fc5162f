use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::PasswordPolicy,
        repo::{UserStore, UserStoreError},
        repo_types::{NewUser, User},
    },
    error::{error_response, internal_response},
    state::AppState,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("User not found")]
    NotFound,
    #[error("Invalid password")]
    InvalidCredential,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            AuthError::DuplicateEmail => {
                error_response(StatusCode::BAD_REQUEST, "Email already registered")
            }
            // Same body for both so login does not reveal which emails exist.
            AuthError::NotFound | AuthError::InvalidCredential => {
                error_response(StatusCode::BAD_REQUEST, "Invalid credentials")
            }
            AuthError::Internal(e) => internal_response(&e),
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration and login over the credential store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    passwords: PasswordPolicy,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.users.clone(),
            state.keys.clone(),
            state.passwords.clone(),
        )
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, passwords: PasswordPolicy) -> Self {
        Self {
            users,
            keys,
            passwords,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("Email & password required".into()));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::Validation("Invalid email".into()));
        }
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let plain = password.to_string();
        let passwords = self.passwords.clone();
        let password_hash = tokio::task::spawn_blocking(move || passwords.hash(&plain))
            .await
            .context("password hashing task")?
            .context("hash password")?;

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                name,
            })
            .await
            .map_err(|e| match e {
                UserStoreError::DuplicateEmail => AuthError::DuplicateEmail,
                UserStoreError::Other(e) => AuthError::Internal(e),
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns a signed access token. Performs no writes.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("Email & password required".into()));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| {
                warn!(email = %email, "login unknown email");
                AuthError::NotFound
            })?;

        let plain = password.to_string();
        let hash = user.password_hash.clone();
        let passwords = self.passwords.clone();
        let ok = tokio::task::spawn_blocking(move || passwords.verify(&plain, &hash))
            .await
            .context("password verification task")?
            .context("verify password")?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredential);
        }

        let token = self.keys.sign(user.id, &user.email)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }
}
