use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{UserError, UserResult};

/// One-way salted hashing of plaintext passwords.
///
/// Implementations are CPU-bound; async callers run them on the blocking pool.
pub trait PasswordHasher: Send + Sync {
    /// Produce a PHC string for `plain` with a fresh salt.
    fn hash(&self, plain: &str) -> UserResult<String>;

    /// Check `plain` against a stored PHC string.
    ///
    /// The service issues no sessions, so nothing in the request path calls
    /// this. It is the check a login flow runs against `password_hash`, and
    /// it is how tests confirm a password change stored the new secret.
    /// `Ok(false)` is a mismatch; `Err` means the stored hash is unreadable.
    fn verify(&self, plain: &str, hash: &str) -> UserResult<bool>;
}

/// Argon2id v1.3 with the crate's default cost parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    fn engine() -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
    }
}

fn hash_error(stage: &'static str, e: password_hash::Error) -> UserError {
    error!(error = %e, stage, "argon2 failure");
    UserError::PasswordHash(e.to_string())
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> UserResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Self::engine()
            .hash_password(plain.as_bytes(), &salt)
            .map(|phc| phc.to_string())
            .map_err(|e| hash_error("hash", e))
    }

    fn verify(&self, plain: &str, hash: &str) -> UserResult<bool> {
        let stored = PasswordHash::new(hash).map_err(|e| hash_error("parse", e))?;
        match Self::engine().verify_password(plain.as_bytes(), &stored) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(hash_error("verify", e)),
        }
    }
}
