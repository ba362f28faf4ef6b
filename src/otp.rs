//! One-time code records and generation.

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};

/// The single outstanding one-time code for an identity.
///
/// The ledger holds at most one of these per email; issuing a new code
/// unconditionally supersedes the previous record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCode {
    pub email: String,
    pub code: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingCode {
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        code: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.into(),
            code: code.into(),
            attempts: 0,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Generate a fixed-length numeric code from the OS entropy source.
#[must_use]
pub fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
