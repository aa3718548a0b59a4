use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token. `sub` is the username; user flags are
/// re-read from the database on every request so revocation takes effect
/// within one request, not one token lifetime.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub fn create_access_token(username: &str, secret: &str, expire_minutes: i64) -> Result<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::minutes(expire_minutes))
        .context("Token expiry overflows")?;

    let claims = Claims {
        sub: username.to_owned(),
        exp: expiration.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to sign access token")
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .context("Invalid or expired token")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = create_access_token("alice", SECRET, 30).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_access_token("alice", SECRET, 30).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_access_token("alice", SECRET, -5).unwrap();
        assert!(verify_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_token("not-a-jwt", SECRET).is_err());
    }
}
