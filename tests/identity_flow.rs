//! End-to-end identity flows against the in-memory stores.

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use civic_auth::{
    Account, AuthConfig, AuthError, CodeSender, CredentialStore as _, IdentityService,
    MemoryCredentialStore, MemoryOtpLedger, OtpLedger as _, OtpMessage, PendingCode, Role,
    TokenSigner,
};
use std::sync::{Arc, Mutex};

/// Sender that records every delivered message.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<OtpMessage>>,
}

impl RecordingSender {
    fn delivered(&self) -> Vec<OtpMessage> {
        self.sent.lock().expect("sender lock").clone()
    }

    fn last_code(&self) -> String {
        self.delivered().last().expect("a code was delivered").code.clone()
    }
}

impl CodeSender for RecordingSender {
    fn send(&self, message: &OtpMessage) -> Result<()> {
        self.sent.lock().expect("sender lock").push(message.clone());
        Ok(())
    }
}

/// Sender whose gateway is always down.
struct FailingSender;

impl CodeSender for FailingSender {
    fn send(&self, _message: &OtpMessage) -> Result<()> {
        Err(anyhow!("smtp connect refused"))
    }
}

struct Harness {
    service: IdentityService,
    accounts: Arc<MemoryCredentialStore>,
    ledger: Arc<MemoryOtpLedger>,
    sender: Arc<RecordingSender>,
}

fn harness() -> Result<Harness> {
    let accounts = Arc::new(MemoryCredentialStore::new());
    let ledger = Arc::new(MemoryOtpLedger::new());
    let sender = Arc::new(RecordingSender::default());
    let signer = TokenSigner::new(vec![7u8; 32], 3600)?;
    let service = IdentityService::new(
        AuthConfig::new(),
        signer,
        accounts.clone(),
        ledger.clone(),
        sender.clone(),
    );
    Ok(Harness {
        service,
        accounts,
        ledger,
        sender,
    })
}

/// A guess guaranteed to differ from `code`: every digit shifted by one.
fn wrong_guess(code: &str) -> String {
    code.chars()
        .map(|c| {
            let digit = c.to_digit(10).unwrap_or(0);
            char::from_digit((digit + 1) % 10, 10).unwrap_or('0')
        })
        .collect()
}

#[tokio::test]
async fn register_then_login_returns_a_token_for_the_identity() -> Result<()> {
    let h = harness()?;
    h.service
        .register("Alice", "alice@example.com", "correct horse")
        .await?;

    let token = h.service.login("alice@example.com", "correct horse").await?;
    assert!(h.service.signer().validate(&token));
    assert_eq!(h.service.signer().identity(&token)?, "alice@example.com");
    assert_eq!(h.service.signer().role(&token)?, Role::User);
    Ok(())
}

#[tokio::test]
async fn login_failures_are_undifferentiated() -> Result<()> {
    let h = harness()?;
    h.service
        .register("Alice", "alice@example.com", "correct horse")
        .await?;

    assert!(matches!(
        h.service.login("alice@example.com", "wrong horse").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        h.service.login("nobody@example.com", "correct horse").await,
        Err(AuthError::InvalidCredentials)
    ));
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts_and_preserves_the_first_hash() -> Result<()> {
    let h = harness()?;
    h.service
        .register("Alice", "alice@example.com", "first password")
        .await?;
    let original_hash = h
        .accounts
        .find_by_email("alice@example.com")
        .await?
        .expect("account registered")
        .password_hash;

    assert!(matches!(
        h.service
            .register("Mallory", "alice@example.com", "second password")
            .await,
        Err(AuthError::IdentityExists)
    ));

    let current_hash = h
        .accounts
        .find_by_email("alice@example.com")
        .await?
        .expect("account still present")
        .password_hash;
    assert_eq!(current_hash, original_hash);

    // The first credentials still work.
    assert!(h.service.login("alice@example.com", "first password").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn rerequest_supersedes_the_previous_code() -> Result<()> {
    let h = harness()?;
    h.service.request_otp("a@x.com").await?;
    h.service.request_otp("a@x.com").await?;

    let delivered = h.sender.delivered();
    assert_eq!(delivered.len(), 2);

    // Exactly one pending code remains, and it is the latest one.
    let pending = h.ledger.get("a@x.com").await?.expect("one pending code");
    assert_eq!(pending.code, delivered[1].code);

    if delivered[0].code != delivered[1].code {
        assert!(matches!(
            h.service.verify_otp("a@x.com", &delivered[0].code).await,
            Err(AuthError::InvalidOtp)
        ));
    }
    Ok(())
}

#[tokio::test]
async fn four_wrong_attempts_then_the_correct_code_succeeds() -> Result<()> {
    let h = harness()?;
    h.service.request_otp("a@x.com").await?;
    let code = h.sender.last_code();
    let wrong = wrong_guess(&code);

    for _ in 0..4 {
        assert!(matches!(
            h.service.verify_otp("a@x.com", &wrong).await,
            Err(AuthError::InvalidOtp)
        ));
    }

    let token = h.service.verify_otp("a@x.com", &code).await?;
    assert_eq!(h.service.signer().identity(&token)?, "a@x.com");

    // One-time use: the code is gone even after success.
    assert!(h.ledger.get("a@x.com").await?.is_none());
    assert!(matches!(
        h.service.verify_otp("a@x.com", &code).await,
        Err(AuthError::NoOtpRequested)
    ));
    Ok(())
}

#[tokio::test]
async fn fifth_wrong_attempt_is_terminal() -> Result<()> {
    let h = harness()?;
    h.service.request_otp("a@x.com").await?;
    let code = h.sender.last_code();
    let wrong = wrong_guess(&code);

    for _ in 0..4 {
        assert!(matches!(
            h.service.verify_otp("a@x.com", &wrong).await,
            Err(AuthError::InvalidOtp)
        ));
    }
    assert!(matches!(
        h.service.verify_otp("a@x.com", &wrong).await,
        Err(AuthError::TooManyAttempts)
    ));

    // The correct code no longer helps: the pending entry is gone.
    assert!(matches!(
        h.service.verify_otp("a@x.com", &code).await,
        Err(AuthError::NoOtpRequested)
    ));
    Ok(())
}

#[tokio::test]
async fn verify_without_a_request_fails() -> Result<()> {
    let h = harness()?;
    assert!(matches!(
        h.service.verify_otp("a@x.com", "123456").await,
        Err(AuthError::NoOtpRequested)
    ));
    Ok(())
}

#[tokio::test]
async fn expired_code_fails_and_does_not_lock_the_identity() -> Result<()> {
    let h = harness()?;

    // Plant an already-expired pending code.
    h.ledger
        .put(PendingCode::new(
            "a@x.com",
            "123456",
            Utc::now() - Duration::seconds(1),
        ))
        .await?;

    assert!(matches!(
        h.service.verify_otp("a@x.com", "123456").await,
        Err(AuthError::OtpExpired)
    ));
    assert!(h.ledger.get("a@x.com").await?.is_none());

    // A fresh request/verify cycle still works.
    h.service.request_otp("a@x.com").await?;
    let code = h.sender.last_code();
    let token = h.service.verify_otp("a@x.com", &code).await?;
    assert!(h.service.signer().validate(&token));
    Ok(())
}

#[tokio::test]
async fn otp_success_auto_provisions_an_account_without_a_usable_password() -> Result<()> {
    let h = harness()?;
    h.service.request_otp("new@x.com").await?;
    let code = h.sender.last_code();

    let token = h.service.verify_otp("new@x.com", &code).await?;
    assert_eq!(h.service.signer().role(&token)?, Role::User);

    let account = h
        .accounts
        .find_by_email("new@x.com")
        .await?
        .expect("account auto-provisioned");
    assert_eq!(account.name, "New User");
    assert_eq!(account.role, Role::User);
    assert!(account.active);
    assert!(account.password_hash.is_some());

    // The placeholder secret was never disclosed, so no password logs in.
    assert!(matches!(
        h.service.login("new@x.com", "anything").await,
        Err(AuthError::InvalidCredentials)
    ));
    Ok(())
}

#[tokio::test]
async fn otp_success_for_a_known_account_keeps_its_role() -> Result<()> {
    let h = harness()?;
    h.accounts
        .save(
            Account::new("admin@x.com", "Root", Role::Admin)
                .with_password_hash("$argon2id$unused"),
        )
        .await?;

    h.service.request_otp("admin@x.com").await?;
    let code = h.sender.last_code();
    let token = h.service.verify_otp("admin@x.com", &code).await?;
    assert_eq!(h.service.signer().role(&token)?, Role::Admin);
    Ok(())
}

#[tokio::test]
async fn malformed_submissions_count_as_wrong_codes() -> Result<()> {
    let h = harness()?;
    h.service.request_otp("a@x.com").await?;

    for bad in ["", "12345", "1234567", "abcdef"] {
        assert!(matches!(
            h.service.verify_otp("a@x.com", bad).await,
            Err(AuthError::InvalidOtp)
        ));
    }
    // Four wrong guesses so far; the next one trips the limit.
    assert!(matches!(
        h.service.verify_otp("a@x.com", "not-it").await,
        Err(AuthError::TooManyAttempts)
    ));
    Ok(())
}

#[tokio::test]
async fn delivery_failure_fails_the_request_and_removes_the_code() -> Result<()> {
    let accounts = Arc::new(MemoryCredentialStore::new());
    let ledger = Arc::new(MemoryOtpLedger::new());
    let signer = TokenSigner::new(vec![7u8; 32], 3600)?;
    let service = IdentityService::new(
        AuthConfig::new(),
        signer,
        accounts,
        ledger.clone(),
        Arc::new(FailingSender),
    );

    assert!(matches!(
        service.request_otp("a@x.com").await,
        Err(AuthError::DeliveryFailed(_))
    ));

    // The undeliverable code was compensated away, not left redeemable.
    assert!(ledger.get("a@x.com").await?.is_none());
    assert!(matches!(
        service.verify_otp("a@x.com", "123456").await,
        Err(AuthError::NoOtpRequested)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_submissions_all_count() -> Result<()> {
    let accounts = Arc::new(MemoryCredentialStore::new());
    let ledger = Arc::new(MemoryOtpLedger::new());
    let signer = TokenSigner::new(vec![7u8; 32], 3600)?;
    // A high attempt limit keeps every wrong guess retryable, so the test
    // observes pure counter behavior under contention.
    let service = Arc::new(IdentityService::new(
        AuthConfig::new().with_max_otp_attempts(100),
        signer,
        accounts,
        ledger.clone(),
        Arc::new(RecordingSender::default()),
    ));

    ledger
        .put(PendingCode::new(
            "a@x.com",
            "123456",
            Utc::now() + Duration::minutes(5),
        ))
        .await?;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.verify_otp("a@x.com", "000000").await
        }));
    }
    for handle in handles {
        assert!(matches!(handle.await?, Err(AuthError::InvalidOtp)));
    }

    // Every wrong submission landed on the counter: no lost updates under
    // the per-identity lock.
    let pending = ledger.get("a@x.com").await?.expect("code still pending");
    assert_eq!(pending.attempts, 20);

    // The slot map pruned nothing it shouldn't have: the identity still
    // verifies normally after the storm.
    let token = service.verify_otp("a@x.com", "123456").await?;
    assert!(service.signer().validate(&token));
    Ok(())
}

#[tokio::test]
async fn otp_flow_normalizes_identities() -> Result<()> {
    let h = harness()?;
    h.service.request_otp(" User@X.COM ").await?;
    let code = h.sender.last_code();

    assert_eq!(h.sender.delivered()[0].to_email, "user@x.com");

    // The differently-cased spelling redeems the same pending code.
    let token = h.service.verify_otp("user@x.com", &code).await?;
    assert_eq!(h.service.signer().identity(&token)?, "user@x.com");
    Ok(())
}
