//! Credential manager: salted adaptive one-way hashing via bcrypt.
//!
//! No plaintext password is ever persisted or logged. The work factor is
//! fixed at construction from configuration.

use crate::error::CoreError;

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plaintext password into a salted digest.
    pub fn hash(&self, plaintext: &str) -> Result<String, CoreError> {
        bcrypt::hash(plaintext, self.cost)
            .map_err(|e| CoreError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Verify a plaintext password against a stored digest.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, CoreError> {
        bcrypt::verify(plaintext, digest)
            .map_err(|e| CoreError::Internal(format!("password verification failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // MIN_COST keeps the deliberately-slow hash fast enough for tests.
    // bcrypt's minimum work factor; the crate keeps its own constant private.
    const MIN_COST: u32 = 4;

    fn test_hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST)
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = test_hasher();
        let digest = hasher.hash("secret1").unwrap();

        assert!(hasher.verify("secret1", &digest).unwrap());
        assert!(!hasher.verify("secret2", &digest).unwrap());
    }

    #[test]
    fn test_digest_is_salted() {
        let hasher = test_hasher();
        let a = hasher.hash("secret1").unwrap();
        let b = hasher.hash("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_never_contains_plaintext() {
        let hasher = test_hasher();
        let digest = hasher.hash("hunter2-plaintext").unwrap();
        assert!(!digest.contains("hunter2"));
    }

    #[test]
    fn test_malformed_digest_is_an_error() {
        let hasher = test_hasher();
        assert!(hasher.verify("anything", "not-a-bcrypt-digest").is_err());
    }
}
