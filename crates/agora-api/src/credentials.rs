use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString, rand_core::OsRng},
};

use crate::error::ServiceError;

/// Password hashing gate for registration and login (Argon2id, salted).
#[derive(Clone)]
pub struct Credentials {
    params: Params,
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl Credentials {
    /// `params` sets the hashing cost for new hashes. Verification always uses
    /// the parameters encoded in the stored hash.
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash_password(&self, plain: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| ServiceError::Internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// A mismatch is [`ServiceError::InvalidCredentials`]; a stored hash that
    /// cannot be parsed is an internal error.
    pub fn verify_password(&self, stored_hash: &str, plain: &str) -> Result<(), ServiceError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| ServiceError::Internal(format!("stored password hash is corrupt: {e}")))?;

        match self.argon2().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(ServiceError::InvalidCredentials),
            Err(e) => Err(ServiceError::Internal(format!("password verification failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Credentials {
        Credentials::new(Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn test_hash_then_verify() {
        let creds = cheap();
        let hash = creds.hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("correct horse"));
        creds.verify_password(&hash, "correct horse").unwrap();
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let creds = cheap();
        let hash = creds.hash_password("correct horse").unwrap();
        assert!(matches!(
            creds.verify_password(&hash, "battery staple"),
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let creds = cheap();
        let a = creds.hash_password("same").unwrap();
        let b = creds.hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_internal() {
        assert!(matches!(
            cheap().verify_password("not-a-hash", "x"),
            Err(ServiceError::Internal(_))
        ));
    }
}
