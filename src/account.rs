//! Account record and role claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of roles carried in bearer-token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Parse the persisted `accounts.role` textual value into a typed enum.
    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid accounts.role value: {value}"),
            )))),
        }
    }
}

/// A registered (or auto-provisioned) identity.
///
/// Emails are stored normalized (trimmed, lowercased); the service applies
/// the normalization before every store interaction. `password_hash` is
/// `None` only for accounts that were provisioned through a verified
/// one-time code and never chose a password, and it is never serialized
/// outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(email: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password_hash: None,
            role,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }
}
