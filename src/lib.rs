//! # civic-auth (CivicPulse identity core)
//!
//! `civic-auth` is the identity-verification and token-issuance core of the
//! CivicPulse platform. It turns a successful identification (a password
//! login or a redeemed one-time code) into a signed, stateless bearer token
//! that downstream services trust without a database round trip.
//!
//! ## Identities
//!
//! An identity is an email address. Emails are **case-insensitive**: every
//! operation trims and lowercases before touching a store, so one mailbox is
//! one account regardless of spelling.
//!
//! ## One-time codes
//!
//! An identity has at most one outstanding code at a time. Requesting a code
//! supersedes the previous one; a code dies on successful redemption, on
//! expiry (5 minutes), or after 5 wrong submissions. Expiry is checked
//! before the attempt counter, and a wrong code counts even on the last
//! allowed try.
//!
//! Redeeming a code for an unknown email **auto-provisions** an account:
//! proving control of the address is accepted as account creation. Such
//! accounts get role `user` and a hash of a random secret that is never
//! disclosed, so they have no usable password.
//!
//! ## Tokens
//!
//! Tokens are HS256-signed claims `{sub, role, iat, exp}` with a 1 hour
//! default lifetime. They are self-verifying and carry no server-side
//! session, which is what lets validation run stateless and lock-free. The
//! accepted trade-off is that a leaked token stays valid until expiry, as
//! there is no revocation path.
//!
//! ## Collaborators
//!
//! The HTTP transport, the civic-report domain, and the real mail transport
//! live outside this crate. They plug in through the [`CredentialStore`],
//! [`OtpLedger`], and [`CodeSender`] seams.

pub mod account;
pub mod config;
pub mod error;
pub mod mailer;
pub mod otp;
pub mod password;
pub mod service;
pub mod store;
pub mod token;

pub use account::{Account, Role};
pub use config::AuthConfig;
pub use error::AuthError;
pub use mailer::{CodeSender, LogCodeSender, OtpMessage};
pub use otp::PendingCode;
pub use password::PasswordHasher;
pub use service::IdentityService;
pub use store::{
    CredentialStore, MemoryCredentialStore, MemoryOtpLedger, OtpLedger, PgCredentialStore,
    PgOtpLedger,
};
pub use token::{Claims, MIN_SECRET_BYTES, TokenSigner};
