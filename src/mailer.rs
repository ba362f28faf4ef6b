//! Out-of-band code delivery abstraction.
//!
//! The core only needs "deliver this code to this address"; the real mail
//! transport lives elsewhere and plugs in through [`CodeSender`]. Delivery
//! failure must surface to the caller: a one-time code whose email never
//! went out is not a successful request.

use anyhow::Result;
use tracing::info;

/// A code ready to be delivered to its address.
#[derive(Clone, Debug)]
pub struct OtpMessage {
    pub to_email: String,
    pub code: String,
}

/// Delivery abstraction used by the identity service.
pub trait CodeSender: Send + Sync {
    /// Deliver a message or return an error to fail the OTP request.
    fn send(&self, message: &OtpMessage) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, message: &OtpMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            code = %message.code,
            "one-time code send stub"
        );
        Ok(())
    }
}
