use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::User;

/// Request body for user registration. Absent and `null` fields both reach
/// validation as `None`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_never_carries_the_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            name: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(RegisterResponse { user: user.into() }).unwrap();
        assert_eq!(json["user"]["email"], "test@example.com");
        assert!(json["user"]["createdAt"].is_string());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn missing_and_null_fields_deserialize_as_none() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.io"}"#).unwrap();
        assert!(req.password.is_none());
        assert!(req.name.is_none());

        let req: LoginRequest =
            serde_json::from_str(r#"{"email":null,"password":"pw"}"#).unwrap();
        assert!(req.email.is_none());
        assert_eq!(req.password.as_deref(), Some("pw"));
    }
}
