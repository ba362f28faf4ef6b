//! In-process store implementations.
//!
//! Each store guards its map with a single async mutex, so every
//! read-modify-write on a pending code happens under exclusion. That is a
//! stricter guarantee than the per-identity serialization the service
//! requires, at a cost that only matters beyond single-node scale.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::account::Account;
use crate::error::AuthError;
use crate::otp::PendingCode;
use crate::store::{CredentialStore, OtpLedger};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.accounts.lock().await.contains_key(email))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.accounts.lock().await.get(email).cloned())
    }

    async fn save(&self, account: Account) -> Result<Account, AuthError> {
        self.accounts
            .lock()
            .await
            .insert(account.email.clone(), account.clone());
        Ok(account)
    }
}

#[derive(Debug, Default)]
pub struct MemoryOtpLedger {
    codes: Mutex<HashMap<String, PendingCode>>,
}

impl MemoryOtpLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpLedger for MemoryOtpLedger {
    async fn put(&self, code: PendingCode) -> Result<(), AuthError> {
        self.codes.lock().await.insert(code.email.clone(), code);
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<PendingCode>, AuthError> {
        Ok(self.codes.lock().await.get(email).cloned())
    }

    async fn increment_attempts(&self, email: &str) -> Result<i32, AuthError> {
        let mut codes = self.codes.lock().await;
        let code = codes.get_mut(email).ok_or(AuthError::NoOtpRequested)?;
        code.attempts += 1;
        Ok(code.attempts)
    }

    async fn remove(&self, email: &str) -> Result<(), AuthError> {
        self.codes.lock().await.remove(email);
        Ok(())
    }
}
