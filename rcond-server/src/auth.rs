//! Password authentication.
//!
//! RCON clients log in with a single shared plaintext password. The
//! validator keeps only the SHA-256 digest of that password and compares
//! digests, so the comparison does not depend on where the inputs differ.
//! Login payloads are compared as raw bytes; they need not be UTF-8.

use sha2::{Digest, Sha256};

/// Validates login payloads against the configured password.
#[derive(Clone)]
pub struct PasswordValidator {
    /// SHA-256 digest of the configured password.
    digest: [u8; 32],
}

impl PasswordValidator {
    /// Creates a validator for the given password.
    pub fn new(password: &str) -> Self {
        Self {
            digest: Self::hash_password(password),
        }
    }

    /// Returns whether `candidate` matches the configured password byte for
    /// byte.
    pub fn validate(&self, candidate: impl AsRef<[u8]>) -> bool {
        let other = Self::hash_password(candidate);
        self.digest
            .iter()
            .zip(other.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Hashes a password using SHA-256.
    pub fn hash_password(password: impl AsRef<[u8]>) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(password.as_ref());
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for PasswordValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordValidator").finish_non_exhaustive()
    }
}
