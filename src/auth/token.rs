//! Compact HS256 JWT minting and verification.
//!
//! Flow Overview:
//! 1) Wrap the typed claims with `token_use`, `iat`, `exp`, and a random `jti`.
//! 2) Sign `base64url(header).base64url(payload)` with HMAC-SHA256.
//! 3) On verify, check the signature first, then `token_use`, then expiry.
//!
//! Access and refresh tokens use separate codec instances, each with its own TTL
//! and `token_use`, so one kind is never accepted in place of the other.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::directory::Role;
use super::error::AuthError;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unexpected token use: {0}")]
    WrongUse(String),
    #[error("token expired")]
    Expired,
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            other => {
                debug!("token rejected: {other}");
                Self::TokenInvalid
            }
        }
    }
}

/// Claims payload carried by one kind of token.
pub trait TokenClaims: Serialize + DeserializeOwned {
    /// Value of the `token_use` claim for this kind.
    const TOKEN_USE: &'static str;
}

/// Claims of a short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Token family of the login session that produced this token.
    pub session_id: Uuid,
}

impl TokenClaims for AccessClaims {
    const TOKEN_USE: &'static str = "access";
}

/// Claims of a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub token_family: Uuid,
    pub version: u32,
}

impl TokenClaims for RefreshClaims {
    const TOKEN_USE: &'static str = "refresh";
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<C> {
    #[serde(flatten)]
    claims: C,
    token_use: String,
    iat: i64,
    exp: i64,
    jti: String,
}

pub struct TokenCodec<C> {
    secret: SecretString,
    ttl: Duration,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Clone for TokenCodec<C> {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            ttl: self.ttl,
            _claims: PhantomData,
        }
    }
}

impl<C> fmt::Debug for TokenCodec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"***")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<C: TokenClaims> TokenCodec<C> {
    #[must_use]
    pub fn new(secret: SecretString, ttl: Duration) -> Self {
        Self {
            secret,
            ttl,
            _claims: PhantomData,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token that expires `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the key is unusable.
    pub fn mint(&self, claims: &C) -> Result<String, TokenError> {
        self.mint_at(claims, Utc::now())
    }

    /// Mint a token as if issued at `now`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the key is unusable.
    pub fn mint_at(&self, claims: &C, now: DateTime<Utc>) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        };
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let envelope = Envelope {
            claims,
            token_use: C::TOKEN_USE.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header_b64 = b64e_json(&header)?;
        let claims_b64 = b64e_json(&envelope)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = self.sign(signing_input.as_bytes())?;
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify signature, token use, and expiry, then return the claims.
    ///
    /// # Errors
    /// Returns `TokenError::Expired` for a well-signed but expired token and
    /// another variant for anything malformed, forged, or of the wrong kind.
    pub fn verify(&self, token: &str) -> Result<C, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify against an explicit clock.
    ///
    /// # Errors
    /// See [`TokenCodec::verify`].
    pub fn verify_at(&self, token: &str, now_unix_seconds: i64) -> Result<C, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let envelope: Envelope<C> = b64d_json(claims_b64)?;
        if envelope.token_use != C::TOKEN_USE {
            return Err(TokenError::WrongUse(envelope.token_use));
        }
        if envelope.exp <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(envelope.claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}
