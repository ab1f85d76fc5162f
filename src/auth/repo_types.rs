use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                   // unique user ID
    pub email: String,              // normalised email, unique
    pub password_hash: String,      // Argon2 PHC string, never plaintext
    pub name: Option<String>,       // display name
    pub created_at: OffsetDateTime, // creation timestamp
}

/// Insert payload for the credential store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
}
