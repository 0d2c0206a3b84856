//! Token service: signed, time-bounded bearer tokens.
//!
//! Tokens are self-contained HS256 claim sets carrying the identity key.
//! Verification is pure computation (no storage access) and cheap enough
//! to run on every request. Rotating the secret invalidates every token
//! previously issued.

use crate::auth::models::Claims;
use crate::error::CoreError;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

/// Token verification failures, mapped to `Unauthenticated` at the
/// session-bootstrap boundary with distinct messages.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Invalid,
    Expired,
}

pub struct TokenService {
    secret: String,
    expiry_days: i64,
}

impl TokenService {
    pub fn new(secret: String, expiry_days: i64) -> Self {
        Self {
            secret,
            expiry_days,
        }
    }

    /// Issue a signed token for an identity key. Returns the token and
    /// its lifetime in seconds.
    pub fn issue(&self, identity_id: Uuid) -> Result<(String, usize), CoreError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::days(self.expiry_days))
            .ok_or_else(|| CoreError::Internal("token expiry overflow".to_string()))?
            .timestamp() as usize;

        let expires_in = (self.expiry_days * 86400) as usize;

        let claims = Claims {
            sub: identity_id.to_string(),
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        debug!(identity = %identity_id, days = self.expiry_days, "issuing token");

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CoreError::Internal(format!("token signing failed: {}", e)))?;

        Ok((token, expires_in))
    }

    /// Verify a token's signature and expiry and return the identity key
    /// it carries.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0; // exact expiry boundary

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        Uuid::parse_str(&decoded.claims.sub).map_err(|_| TokenError::Invalid)
    }
}
