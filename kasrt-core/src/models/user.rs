use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An administrative user (treasurer, RT/RW staff) able to log in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Email address (unique).
    pub email: String,
    /// Bcrypt hashed password, never serialized to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    /// "admin", "bendahara" or "rt".
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Public representation returned by the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name.clone(),
            role: user.role.clone(),
        }
    }
}
