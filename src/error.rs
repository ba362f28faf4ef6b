//! Error taxonomy for the identity core.
//!
//! Every variant here is a caller-visible, typed failure; nothing is retried
//! internally. Token validation deliberately collapses bad signature, bad
//! encoding, and malformed structure into [`AuthError::TokenInvalid`] so the
//! error never tells a forger which part of the token was wrong. Expiry of an
//! otherwise well-signed token is the one distinction callers may see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity is not a valid email address")]
    InvalidIdentity,
    #[error("password must not be empty")]
    InvalidPassword,
    #[error("an account already exists for this identity")]
    IdentityExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no one-time code was requested for this identity")]
    NoOtpRequested,
    #[error("one-time code expired")]
    OtpExpired,
    #[error("invalid one-time code")]
    InvalidOtp,
    #[error("too many failed attempts")]
    TooManyAttempts,
    #[error("failed to deliver one-time code")]
    DeliveryFailed(#[source] anyhow::Error),
    #[error("invalid token")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("signing secret must be at least 32 bytes")]
    WeakSecret,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Whether a failed OTP submission may simply be retried with another code.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidOtp)
    }
}
