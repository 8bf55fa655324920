//! Authentication primitives
//!
//! bcrypt password hashing and HS256 token issuance for the query-side
//! login endpoint.

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hash a plaintext password with the default bcrypt cost.
pub fn hash_password(plain: &str) -> Result<String, bcrypt::BcryptError> {
    hash(plain, DEFAULT_COST)
}

/// Verify a plaintext password against a stored hash. A hash that fails to
/// parse must never authenticate, so errors collapse to `false`.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    verify(plain, hashed).unwrap_or(false)
}

/// Token claims issued on successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Sign an access token for a user.
    pub fn sign(&self, user_id: Uuid, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_jwt_roundtrip() {
        let keys = JwtKeys::new("test-secret", 60);
        let user_id = Uuid::new_v4();

        let token = keys.sign(user_id, "alice@example.com").unwrap();
        assert!(!token.is_empty());

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_jwt_rejects_wrong_secret() {
        let keys = JwtKeys::new("secret-a", 60);
        let other = JwtKeys::new("secret-b", 60);

        let token = keys.sign(Uuid::new_v4(), "a@x.io").unwrap();
        assert!(other.verify(&token).is_err());
    }
}
