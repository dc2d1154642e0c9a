use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use tracing::{debug, warn};

use agora_cache::KvCache;
use agora_types::api::Claims;

use crate::error::{AuthError, ServiceError};

/// Value stored under a revoked token's key.
const REVOKED_MARKER: &str = "blocked";

/// Issues HS256 access tokens and keeps the denylist of revoked ones.
///
/// A revoked token is stored under its raw string with a TTL equal to its
/// remaining lifetime, so denylist entries disappear exactly when the token
/// would have stopped verifying anyway.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
    revoked: Arc<dyn KvCache>,
}

impl TokenService {
    pub fn new(secret: &str, ttl: TimeDelta, revoked: Arc<dyn KvCache>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            revoked,
        }
    }

    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, ServiceError> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| ServiceError::Internal(format!("access token expiry out of range: {}", self.ttl)))?;
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("failed to sign access token: {e}")))
    }

    /// Signature, expiry, then the denylist.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode_claims(token)?;

        match self.revoked.get(token) {
            Ok(Some(_)) => {
                debug!("Token for user {} is revoked", claims.user_id);
                Err(AuthError::Revoked)
            }
            Ok(None) => Ok(claims),
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    /// Adds `token` to the denylist until `exp`. A token that already expired
    /// needs no entry.
    pub fn revoke(&self, token: &str, exp: i64) -> Result<(), ServiceError> {
        let Some(expires_at) = DateTime::<Utc>::from_timestamp(exp, 0) else {
            return Err(ServiceError::Internal(format!("token expiry out of range: {exp}")));
        };

        match (expires_at - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => {
                self.revoked.set(token, REVOKED_MARKER.to_string(), remaining)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    warn!("Invalid token: {}", e);
                    AuthError::Invalid
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agora_cache::MemoryCache;

    use super::*;

    fn service(ttl: TimeDelta) -> (TokenService, MemoryCache) {
        let cache = MemoryCache::new();
        (TokenService::new("test-secret", ttl, Arc::new(cache.clone())), cache)
    }

    #[test]
    fn test_issue_and_verify() {
        let (tokens, _) = service(TimeDelta::hours(1));
        let token = tokens.issue("u1", "u1@example.com").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email, "u1@example.com");
        let expected = (Utc::now() + TimeDelta::hours(1)).timestamp();
        assert!((claims.exp - expected).abs() <= 2);
    }

    #[test]
    fn test_unrepresentable_expiry_is_an_error() {
        let (tokens, _) = service(TimeDelta::days(365 * 1_000_000));
        assert!(matches!(tokens.issue("u1", "u1@example.com"), Err(ServiceError::Internal(_))));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (tokens, _) = service(TimeDelta::hours(1));
        let token = tokens.issue("u1", "u1@example.com").unwrap();
        let other = TokenService::new("other-secret", TimeDelta::hours(1), Arc::new(MemoryCache::new()));
        assert!(matches!(other.verify(&token), Err(AuthError::Invalid)));
        assert!(matches!(tokens.verify("garbage"), Err(AuthError::Invalid)));
    }

    #[test]
    fn test_expired_token() {
        let (tokens, _) = service(TimeDelta::seconds(-10));
        let token = tokens.issue("u1", "u1@example.com").unwrap();
        assert!(matches!(tokens.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_revoked_token_is_rejected() {
        let (tokens, cache) = service(TimeDelta::hours(1));
        let token = tokens.issue("u1", "u1@example.com").unwrap();
        let claims = tokens.verify(&token).unwrap();

        tokens.revoke(&token, claims.exp).unwrap();
        assert!(matches!(tokens.verify(&token), Err(AuthError::Revoked)));
        assert_eq!(cache.get(&token).unwrap().as_deref(), Some(REVOKED_MARKER));
    }

    #[test]
    fn test_revocation_entry_expires_with_token() {
        let (tokens, cache) = service(TimeDelta::seconds(2));
        let token = tokens.issue("u1", "u1@example.com").unwrap();
        let claims = tokens.verify(&token).unwrap();

        tokens.revoke(&token, claims.exp).unwrap();
        assert!(cache.get(&token).unwrap().is_some());

        // One extra second: expiry is checked at whole-second resolution.
        std::thread::sleep(Duration::from_millis(3100));
        assert_eq!(cache.get(&token).unwrap(), None);
        assert!(matches!(tokens.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_revoking_expired_token_stores_nothing() {
        let (tokens, cache) = service(TimeDelta::hours(1));
        tokens.revoke("stale", Utc::now().timestamp() - 5).unwrap();
        assert!(cache.is_empty());
    }
}
