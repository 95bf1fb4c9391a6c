//! Session management: JWT access tokens carrying the caller's role

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::domain::{Actor, Role};

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
}

/// Create a signed access token for `actor`
#[cfg(test)]
pub fn create_access_token(actor: &Actor, secret: &[u8]) -> Result<String, SessionError> {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 60;

    let now = Utc::now();
    let exp = now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES);

    let claims = Claims {
        sub: actor.user_id.to_string(),
        role: actor.role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|_| SessionError::InvalidToken)
}

/// Validate an access token and return the actor it was issued to
pub fn validate_access_token(token: &str, secret: &[u8]) -> Result<Actor, SessionError> {
    // HS256 only, so a token cannot pick its own algorithm
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::InvalidToken,
        })?;

    let user_id = token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidToken)?;

    Ok(Actor::new(user_id, token_data.claims.role))
}
