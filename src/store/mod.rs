//! Durable store seams for accounts and pending one-time codes.
//!
//! Both traits take already-normalized emails; the identity service applies
//! trim + lowercase before every call. The Postgres implementations are the
//! deployment story, the in-memory ones back tests and single-node use.

use async_trait::async_trait;

use crate::account::Account;
use crate::error::AuthError;
use crate::otp::PendingCode;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCredentialStore, MemoryOtpLedger};
pub use postgres::{PgCredentialStore, PgOtpLedger};

/// Durable mapping from email to account record.
///
/// The store is expected to enforce email uniqueness atomically and signal a
/// conflict on violation; the core performs no uniqueness retries of its own.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self, email: &str) -> Result<bool, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;

    /// Insert or update, keyed by email.
    async fn save(&self, account: Account) -> Result<Account, AuthError>;
}

/// Single-slot-per-identity store of pending one-time codes.
#[async_trait]
pub trait OtpLedger: Send + Sync {
    /// Store a pending code, replacing any existing record for its email.
    async fn put(&self, code: PendingCode) -> Result<(), AuthError>;

    async fn get(&self, email: &str) -> Result<Option<PendingCode>, AuthError>;

    /// Atomically bump the attempt counter and return the new count.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoOtpRequested`] if no record exists, which can
    /// happen when a concurrent verification already consumed the code.
    async fn increment_attempts(&self, email: &str) -> Result<i32, AuthError>;

    async fn remove(&self, email: &str) -> Result<(), AuthError>;
}
