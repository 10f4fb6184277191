use std::collections::HashSet;
use std::time::Duration;

use jsonwebtoken::{decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;
use crate::routes::auth::claims::Claims;

/// HS256 needs at least as many key bytes as the hash output.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_DISTINCT_SECRET_BYTES: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET is {actual} bytes; at least {} are required", MIN_JWT_SECRET_LENGTH)]
    TooShort { actual: usize },
    #[error("JWT_SECRET uses only {distinct} distinct bytes; pick a random value")]
    Repetitive { distinct: usize },
}

/// Signing material plus the issuer and audience every session token carries.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Result<Self, JwtSecretError> {
        check_secret(secret.as_bytes())?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, JwtSecretError> {
        Self::new(&config.jwt_secret, &config.jwt_issuer, &config.jwt_audience)
    }

    /// Signs a session token for `user_id` that expires after `ttl`.
    pub fn issue_token(&self, user_id: Uuid, username: &str, ttl: Duration) -> Result<String, Error> {
        let expires_at = OffsetDateTime::now_utc().unix_timestamp() + ttl.as_secs() as i64;
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_owned(),
            exp: expires_at.max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Checks signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

pub trait JwtKeyProvider {
    fn jwt_keys(&self) -> &JwtKeys;
}

fn check_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    if secret.is_empty() {
        return Err(JwtSecretError::Missing);
    }
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(JwtSecretError::TooShort {
            actual: secret.len(),
        });
    }
    let distinct = secret.iter().collect::<HashSet<_>>().len();
    if distinct < MIN_DISTINCT_SECRET_BYTES {
        return Err(JwtSecretError::Repetitive { distinct });
    }
    Ok(())
}
