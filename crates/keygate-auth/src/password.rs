//! Password hashing using Argon2id

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::HashingConfig;
use crate::error::{ConfigError, PasswordError};

/// Longest accepted plaintext, in bytes
pub const MAX_PASSWORD_BYTES: usize = 4096;

/// One-way password hashing with configurable Argon2id costs
///
/// Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so
/// verification always uses the parameters recorded in the stored hash.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            params: config.params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::Encoding(format!(
                "password exceeds {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Verify a password against a stored hash
    ///
    /// Malformed hashes and oversized input verify as `false`.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return false;
        }

        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Whether a stored hash was produced with different settings than the
    /// current ones and should be replaced on the next successful login
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };

        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return true;
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }

        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
