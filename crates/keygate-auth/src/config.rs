//! Authentication configuration
//!
//! These structs are deserialized once at startup, validated, and then only
//! ever read. Nothing in the crate keeps configuration in global state.

use std::str::FromStr;

use argon2::Params;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
}

impl AuthConfig {
    /// Check every section, failing on the first invalid value
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token.validate()?;
        self.hashing.params()?;
        Ok(())
    }
}

/// Session token configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret; required
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: default_algorithm(),
            lifetime_minutes: default_lifetime_minutes(),
        }
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("lifetime_minutes", &self.lifetime_minutes)
            .finish()
    }
}

impl TokenConfig {
    /// Validate the token settings and return the parsed signing algorithm
    pub fn validate(&self) -> Result<Algorithm, ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        let algorithm = Algorithm::from_str(self.algorithm.trim())
            .map_err(|_| ConfigError::UnsupportedAlgorithm(self.algorithm.clone()))?;

        // Only symmetric MACs make sense with a shared string secret
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::UnsupportedAlgorithm(self.algorithm.clone()));
        }

        if self.lifetime_minutes <= 0 {
            return Err(ConfigError::InvalidLifetime(self.lifetime_minutes));
        }

        Ok(algorithm)
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl HashingConfig {
    /// Build argon2 parameters, rejecting values argon2 would refuse
    pub fn params(&self) -> Result<Params, ConfigError> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| ConfigError::InvalidHashing(e.to_string()))
    }
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_lifetime_minutes() -> i64 {
    15
}

fn default_memory_kib() -> u32 {
    Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    Params::DEFAULT_P_COST
}
