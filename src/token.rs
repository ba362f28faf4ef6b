//! Stateless bearer tokens (HS256).
//!
//! The token is the only state carried between requests: a self-verifying
//! assertion of `{sub, role, iat, exp}` signed with a shared secret. Claims
//! are never trusted before the keyed MAC over the signing input verifies in
//! constant time, and the expiry check runs only after the signature check so
//! forged tokens learn nothing from the error they get back.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::account::Role;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing secret size: 256 bits.
pub const MIN_SECRET_BYTES: usize = 32;

const TOKEN_ALG: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Verified token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|_| AuthError::TokenInvalid)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, AuthError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| AuthError::TokenInvalid)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::TokenInvalid)
}

/// Issues and validates bearer tokens with a shared secret.
pub struct TokenSigner {
    secret: SecretSlice<u8>,
    ttl_seconds: i64,
}

impl TokenSigner {
    /// Create a signer with a shared secret and a token time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakSecret`] if the secret is shorter than
    /// [`MIN_SECRET_BYTES`]. A misconfigured secret is a startup-time
    /// failure, never a per-call one.
    pub fn new(secret: impl Into<Vec<u8>>, ttl_seconds: i64) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::WeakSecret);
        }
        Ok(Self {
            secret: SecretSlice::from(secret),
            ttl_seconds,
        })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.secret.expose_secret())
            .map_err(|_| AuthError::TokenInvalid)
    }

    /// Issue a token for an identity/role pair, expiring `ttl_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, identity: &str, role: Role) -> Result<String, AuthError> {
        self.issue_at(identity, role, Utc::now().timestamp())
    }

    /// Issue a token with an explicit issued-at instant (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_at(&self, identity: &str, role: Role, now_unix: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: identity.to_string(),
            role,
            iat: now_unix,
            exp: now_unix + self.ttl_seconds,
        };
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token against the current time and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] for any structural, encoding, or
    /// signature problem, and [`AuthError::TokenExpired`] for a well-signed
    /// token whose `exp` has passed.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token against an explicit instant (unix seconds).
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::verify`].
    pub fn verify_at(&self, token: &str, now_unix: i64) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(AuthError::TokenInvalid)?;
        let claims_b64 = parts.next().ok_or(AuthError::TokenInvalid)?;
        let sig_b64 = parts.next().ok_or(AuthError::TokenInvalid)?;
        if parts.next().is_some() {
            return Err(AuthError::TokenInvalid);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != TOKEN_ALG {
            return Err(AuthError::TokenInvalid);
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| AuthError::TokenInvalid)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::TokenInvalid)?;

        // Claims are decoded only after the signature holds.
        let claims: Claims = b64d_json(claims_b64)?;
        if claims.exp <= now_unix {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Whether a token is currently valid.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    /// Extract the identity from a token, verifying it first.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::verify`]; claims from an invalid or expired
    /// token are never returned.
    pub fn identity(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.verify(token)?.sub)
    }

    /// Extract the role from a token, verifying it first.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::verify`].
    pub fn role(&self, token: &str) -> Result<Role, AuthError> {
        Ok(self.verify(token)?.role)
    }
}
