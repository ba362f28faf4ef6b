//! Identity service: the orchestrator for registration, login, and the
//! one-time-code lifecycle.
//!
//! Per-identity mutual exclusion wraps every read-modify-write on the OTP
//! ledger (supersede on request, attempt counting on verify), so concurrent
//! submissions for the same email never lose an update. Register, login, and
//! token work need no cross-identity coordination.

use chrono::{Duration, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::account::{Account, Role};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mailer::{CodeSender, OtpMessage};
use crate::otp::{PendingCode, generate_code};
use crate::password::{PasswordHasher, generate_placeholder_secret};
use crate::store::{CredentialStore, OtpLedger};
use crate::token::TokenSigner;

const PROVISIONED_ACCOUNT_NAME: &str = "New User";

/// Normalize an email for lookup/uniqueness checks.
///
/// Identities are case-insensitive: trim + lowercase before every store
/// interaction, so `Alice@Example.COM` and `alice@example.com` are one
/// account.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Keyed async locks serializing OTP ledger access per identity.
#[derive(Default)]
struct IdentityLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    async fn acquire(&self, email: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.inner.lock().await;
            // Drop slots nobody holds so the map tracks live identities only.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            locks
                .entry(email.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

/// Composes the credential store, password hasher, OTP ledger, code
/// delivery, and token signer into the four identity operations.
pub struct IdentityService {
    config: AuthConfig,
    signer: TokenSigner,
    hasher: PasswordHasher,
    accounts: Arc<dyn CredentialStore>,
    ledger: Arc<dyn OtpLedger>,
    sender: Arc<dyn CodeSender>,
    locks: IdentityLocks,
}

impl IdentityService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        accounts: Arc<dyn CredentialStore>,
        ledger: Arc<dyn OtpLedger>,
        sender: Arc<dyn CodeSender>,
    ) -> Self {
        Self {
            config,
            signer,
            hasher: PasswordHasher,
            accounts,
            ledger,
            sender,
            locks: IdentityLocks::default(),
        }
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Create a password account. Registration does not issue a token;
    /// login is a separate step.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::IdentityExists`] when the email is taken,
    /// [`AuthError::InvalidIdentity`]/[`AuthError::InvalidPassword`] for
    /// defensively rejected input, or a storage/hashing failure.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidIdentity);
        }
        if raw_password.is_empty() {
            return Err(AuthError::InvalidPassword);
        }
        if self.accounts.exists(&email).await? {
            return Err(AuthError::IdentityExists);
        }

        let hash = self.hasher.hash(raw_password)?;
        let account = Account::new(email, name, Role::User).with_password_hash(hash);
        let account = self.accounts.save(account).await?;
        info!(email = %account.email, "registered account");
        Ok(account)
    }

    /// Verify password credentials and issue a bearer token.
    ///
    /// # Errors
    ///
    /// Unknown email and wrong password both return
    /// [`AuthError::InvalidCredentials`]; the failure never says which, to
    /// avoid identity enumeration.
    pub async fn login(&self, email: &str, raw_password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || raw_password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = account.password_hash.as_deref() else {
            // OTP-provisioned account that never set a password.
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(raw_password, hash) {
            return Err(AuthError::InvalidCredentials);
        }

        self.signer.issue(&account.email, account.role)
    }

    /// Generate, store, and deliver a one-time code for an identity.
    ///
    /// Issuing supersedes any previous pending code: one outstanding code
    /// per email, and a resend invalidates the old one. The code is stored
    /// before delivery; if delivery fails, the just-written entry is removed
    /// again so an undeliverable code is never left redeemable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DeliveryFailed`] when the gateway rejects the
    /// send, or [`AuthError::InvalidIdentity`] for malformed addresses.
    pub async fn request_otp(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidIdentity);
        }
        let _guard = self.locks.acquire(&email).await;

        let code = generate_code(self.config.otp_code_length());
        let expires_at = Utc::now() + Duration::seconds(self.config.otp_ttl_seconds());
        self.ledger
            .put(PendingCode::new(email.clone(), code.clone(), expires_at))
            .await?;

        let message = OtpMessage {
            to_email: email.clone(),
            code,
        };
        if let Err(err) = self.sender.send(&message) {
            error!(to_email = %email, "failed to deliver one-time code: {err}");
            // Compensate: an undelivered code must not stay redeemable.
            self.ledger.remove(&email).await?;
            return Err(AuthError::DeliveryFailed(err));
        }
        Ok(())
    }

    /// Redeem a one-time code for a bearer token.
    ///
    /// Checks run in a fixed order: presence, then expiry, then the code
    /// itself. A wrong code always increments the attempt counter, even on
    /// the final allowed try; reaching the limit removes the pending code. A
    /// match consumes the code, auto-provisions an account for a
    /// previously-unknown email (role user, no usable password), and issues
    /// a token.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoOtpRequested`], [`AuthError::OtpExpired`],
    /// [`AuthError::TooManyAttempts`] are terminal for the pending code;
    /// [`AuthError::InvalidOtp`] leaves it in place for a retry.
    pub async fn verify_otp(&self, email: &str, submitted_code: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidIdentity);
        }
        let _guard = self.locks.acquire(&email).await;

        let Some(pending) = self.ledger.get(&email).await? else {
            return Err(AuthError::NoOtpRequested);
        };

        if pending.is_expired_at(Utc::now()) {
            self.ledger.remove(&email).await?;
            return Err(AuthError::OtpExpired);
        }

        // Wrong length or non-digit input is just a wrong code, not a
        // distinct error class.
        if submitted_code != pending.code {
            let attempts = self.ledger.increment_attempts(&email).await?;
            if attempts >= self.config.max_otp_attempts() {
                self.ledger.remove(&email).await?;
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::InvalidOtp);
        }

        // One-time use: consume the code even on success.
        self.ledger.remove(&email).await?;

        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => self.provision_account(&email).await?,
        };

        self.signer.issue(&account.email, account.role)
    }

    /// Create an account for an email proven by OTP but never registered.
    ///
    /// Deliberate policy, not a side effect: controlling the address is
    /// accepted as account creation. The stored hash is of a random secret
    /// that is never disclosed, so the account has no usable password.
    async fn provision_account(&self, email: &str) -> Result<Account, AuthError> {
        let secret = generate_placeholder_secret()?;
        let hash = self.hasher.hash(&secret)?;
        let account = Account::new(email, PROVISIONED_ACCOUNT_NAME, Role::User)
            .with_password_hash(hash);
        let account = self.accounts.save(account).await?;
        info!(email = %account.email, "auto-provisioned account from verified one-time code");
        Ok(account)
    }
}
