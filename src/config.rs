//! Identity core configuration.

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_MAX_OTP_ATTEMPTS: i32 = 5;
const DEFAULT_OTP_CODE_LENGTH: usize = 6;

/// Tunables for the identity service.
///
/// Defaults match the platform policy: 1 hour bearer tokens, 5 minute
/// one-time codes, 5 wrong submissions before a pending code is invalidated.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    max_otp_attempts: i32,
    otp_code_length: usize,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            max_otp_attempts: DEFAULT_MAX_OTP_ATTEMPTS,
            otp_code_length: DEFAULT_OTP_CODE_LENGTH,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_otp_attempts(mut self, attempts: i32) -> Self {
        self.max_otp_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn max_otp_attempts(&self) -> i32 {
        self.max_otp_attempts
    }

    #[must_use]
    pub fn otp_code_length(&self) -> usize {
        self.otp_code_length
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
