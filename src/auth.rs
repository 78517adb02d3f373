// src/auth.rs
//
// Magic-link sign-in hands out a signed session token (HS256 JWT). Requests
// carry it as `Authorization: Bearer <token>`.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    services::Platform,
    user::{Role, User},
};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Checks the signature, then expiry against `now` rather than the system clock.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.exp <= now.timestamp() {
            return Err(Error::Unauthorized("session has expired".to_string()));
        }
        Ok(claims)
    }
}

/// The signed-in caller.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn require(&self, role: Role) -> Result<&Self> {
        if self.role != role {
            return Err(Error::Forbidden(format!("{} access required", role)));
        }
        Ok(self)
    }
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<Platform> for Session {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Platform) -> Result<Self> {
        let token = bearer_token(parts)
            .ok_or_else(|| Error::Unauthorized("missing or invalid bearer token".to_string()))?;

        let claims = state.sessions().verify(token, state.now())?;
        Ok(claims.into())
    }
}
