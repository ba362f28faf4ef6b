//! Postgres-backed store implementations.
//!
//! Queries are bound at runtime and wrapped in `db.query` spans. The ledger
//! leans on the database for its concurrency contract: `put` replaces inside
//! a transaction and `increment_attempts` is a single atomic
//! `UPDATE .. RETURNING`, so concurrent verifications never lose a count.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use crate::account::{Account, Role};
use crate::error::AuthError;
use crate::otp::PendingCode;
use crate::store::{CredentialStore, OtpLedger};

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            role: Role::from_db(&role)?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for PendingCode {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            email: row.try_get("email")?,
            code: row.try_get("code")?,
            attempts: row.try_get("attempts")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn exists(&self, email: &str) -> Result<bool, AuthError> {
        let query = "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1) AS present";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check account existence")?;
        Ok(row.get("present"))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        let query = r"
            SELECT email, name, password_hash, role, active, created_at
            FROM accounts
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;

        row.map(|row| Account::from_row(&row))
            .transpose()
            .context("failed to decode account row")
            .map_err(AuthError::from)
    }

    async fn save(&self, account: Account) -> Result<Account, AuthError> {
        let query = r"
            INSERT INTO accounts (email, name, password_hash, role, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                password_hash = EXCLUDED.password_hash,
                role = EXCLUDED.role,
                active = EXCLUDED.active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.active)
            .bind(account.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save account")?;
        Ok(account)
    }
}

#[derive(Clone)]
pub struct PgOtpLedger {
    pool: PgPool,
}

impl PgOtpLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpLedger for PgOtpLedger {
    async fn put(&self, code: PendingCode) -> Result<(), AuthError> {
        // Delete-then-insert in one transaction keeps the single-active-code
        // invariant even when two requests race on the same email.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin otp replace transaction")?;

        let delete = "DELETE FROM otp_codes WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = delete
        );
        sqlx::query(delete)
            .bind(&code.email)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete superseded otp code")?;

        let insert = r"
            INSERT INTO otp_codes (email, code, attempts, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert
        );
        sqlx::query(insert)
            .bind(&code.email)
            .bind(&code.code)
            .bind(code.attempts)
            .bind(code.expires_at)
            .bind(code.created_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert otp code")?;

        tx.commit()
            .await
            .context("failed to commit otp replace transaction")?;
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<PendingCode>, AuthError> {
        let query = r"
            SELECT email, code, attempts, expires_at, created_at
            FROM otp_codes
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup otp code")?;

        row.map(|row| PendingCode::from_row(&row))
            .transpose()
            .context("failed to decode otp row")
            .map_err(AuthError::from)
    }

    async fn increment_attempts(&self, email: &str) -> Result<i32, AuthError> {
        let query = r"
            UPDATE otp_codes
            SET attempts = attempts + 1
            WHERE email = $1
            RETURNING attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment otp attempts")?;

        match row {
            Some(row) => Ok(row.get("attempts")),
            None => Err(AuthError::NoOtpRequested),
        }
    }

    async fn remove(&self, email: &str) -> Result<(), AuthError> {
        let query = "DELETE FROM otp_codes WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to remove otp code")?;
        Ok(())
    }
}
