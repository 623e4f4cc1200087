//! Keygate Authentication Core
//!
//! This crate provides credential verification and stateless session
//! tokens: Argon2id password hashing, HMAC-signed JWTs, and the services
//! that combine them with a user directory.

pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod jwt;
pub mod password;
pub mod resolver;
pub mod service;

pub use config::{AuthConfig, HashingConfig, TokenConfig};
pub use directory::{InMemoryDirectory, UserDirectory, UserRecord};
pub use error::{
    AuthFailure, ConfigError, DirectoryError, LoginRejection, PasswordError, SessionFailure,
    TokenError, Unauthenticated,
};
pub use http::{CurrentUser, extract_bearer_token};
pub use jwt::{Claims, SessionToken, TokenService};
pub use password::PasswordHasher;
pub use resolver::SessionResolver;
pub use service::AuthenticationService;

/// Re-export so callers can construct cancellation signals without a direct dependency
pub use tokio_util::sync::CancellationToken;
