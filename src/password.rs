//! Password hashing behind Argon2id.
//!
//! Hashes embed a per-password random salt and the full parameter set in the
//! PHC string, so verification needs no out-of-band configuration.

use anyhow::{Context, anyhow};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::Argon2;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

use crate::error::AuthError;

/// Salted, deliberately slow one-way hashing with constant-time verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    /// Hash a plaintext password into a self-describing PHC string.
    ///
    /// # Errors
    ///
    /// Returns an error if the Argon2 computation fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored hash.
    ///
    /// Unparseable hashes verify as `false` rather than erroring, so a
    /// corrupted row behaves like a wrong password.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Random secret for auto-provisioned accounts.
///
/// The value is hashed and stored but never disclosed, so such accounts have
/// no usable password until the owner sets one.
pub(crate) fn generate_placeholder_secret() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate placeholder secret")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
