//! Credential verification and login

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::{UserDirectory, UserRecord, lookup_cancellable};
use crate::error::{AuthFailure, PasswordError};
use crate::jwt::{SessionToken, TokenService};
use crate::password::PasswordHasher;

/// Plaintext hashed once at startup to produce the timing guard hash
const TIMING_GUARD_PLAINTEXT: &str = "keygate-timing-guard";

/// Verifies credentials against a [`UserDirectory`] and mints session tokens
pub struct AuthenticationService {
    directory: Arc<dyn UserDirectory>,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    /// Verified against when the user does not exist, so unknown usernames
    /// cost the same as wrong passwords
    timing_guard_hash: String,
}

impl AuthenticationService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        hasher: PasswordHasher,
        tokens: Arc<TokenService>,
    ) -> Result<Self, PasswordError> {
        let timing_guard_hash = hasher.hash(TIMING_GUARD_PLAINTEXT)?;

        Ok(Self {
            directory,
            hasher,
            tokens,
            timing_guard_hash,
        })
    }

    /// Check a username and password
    ///
    /// Does not look at the active flag; [`login`](Self::login) does.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<UserRecord, AuthFailure> {
        let result = self.check_credentials(username, password, cancel).await;

        if let Err(failure) = &result {
            warn!(
                username = loggable_username(failure, username),
                kind = failure.kind(),
                "Credential check failed"
            );
        }

        result
    }

    async fn check_credentials(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<UserRecord, AuthFailure> {
        let user = match lookup_cancellable(self.directory.as_ref(), username, cancel).await {
            None => return Err(AuthFailure::Cancelled),
            Some(result) => result?,
        };

        // Always run a verification so both failure paths take comparable time
        let hash = user
            .as_ref()
            .map_or(self.timing_guard_hash.as_str(), |u| u.password_hash.as_str());
        let password_valid = self.hasher.verify(password, hash);

        match user {
            None => Err(AuthFailure::NotFound),
            Some(_) if !password_valid => Err(AuthFailure::BadPassword),
            Some(user) => {
                if self.hasher.needs_rehash(&user.password_hash) {
                    warn!(username = %user.username, "Stored password hash uses outdated parameters");
                }
                debug!("Credentials verified for user: {}", user.username);
                Ok(user)
            }
        }
    }

    /// Authenticate, require an active account, and issue a session token
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionToken, AuthFailure> {
        let user = self.authenticate(username, password, cancel).await?;

        if !user.active {
            let failure = AuthFailure::Inactive;
            warn!(
                username = loggable_username(&failure, username),
                kind = failure.kind(),
                "Login rejected"
            );
            return Err(failure);
        }

        let token = self.tokens.issue(&user.username, None).map_err(|e| {
            let failure = AuthFailure::from(e);
            warn!(kind = failure.kind(), error = %failure, "Login rejected");
            failure
        })?;

        info!("User {} logged in successfully", user.username);
        Ok(token)
    }
}

/// Username to attach to a failure log, if any
///
/// Only failures that prove the account exists carry it. Input matching no
/// account may be a password typed into the username field.
fn loggable_username<'a>(failure: &AuthFailure, username: &'a str) -> Option<&'a str> {
    matches!(failure, AuthFailure::BadPassword | AuthFailure::Inactive).then_some(username)
}
