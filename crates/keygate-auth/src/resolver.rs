//! Bearer token resolution

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::directory::{UserDirectory, UserRecord, lookup_cancellable};
use crate::error::SessionFailure;
use crate::jwt::TokenService;

/// Turns a presented bearer token into the current user
///
/// Stages run in order (signature, expiry, subject lookup, active flag) and
/// the first failing stage decides the outcome.
pub struct SessionResolver {
    tokens: Arc<TokenService>,
    directory: Arc<dyn UserDirectory>,
}

impl SessionResolver {
    pub fn new(tokens: Arc<TokenService>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { tokens, directory }
    }

    pub async fn resolve(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<UserRecord, SessionFailure> {
        let result = self.resolve_stages(token, cancel).await;

        match &result {
            Ok(user) => debug!("Resolved session for user: {}", user.username),
            Err(failure) => warn!(kind = failure.kind(), "Session rejected"),
        }

        result
    }

    async fn resolve_stages(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<UserRecord, SessionFailure> {
        let claims = self.tokens.verify(token)?;

        let user = match lookup_cancellable(self.directory.as_ref(), &claims.sub, cancel).await {
            None => return Err(SessionFailure::Cancelled),
            Some(result) => result?,
        };

        // The user may have been deleted after the token was issued
        let user = user.ok_or(SessionFailure::UnknownSubject)?;

        if !user.active {
            return Err(SessionFailure::Inactive);
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthFailure, DirectoryError, Unauthenticated};
    use crate::service::AuthenticationService;
    use crate::service::tests::{seeded_directory, token_service};
    use crate::password::tests::fast_hasher;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_login_then_resolve() {
        let directory = seeded_directory();
        let tokens = token_service();
        let auth = AuthenticationService::new(directory.clone(), fast_hasher(), tokens.clone()).unwrap();
        let resolver = SessionResolver::new(tokens, directory);
        let cancel = CancellationToken::new();

        let token = auth.login("alice", "correct", &cancel).await.unwrap();
        let user = resolver.resolve(&token.access_token, &cancel).await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_deleted_user_is_unknown_subject() {
        let directory = seeded_directory();
        let tokens = token_service();
        let token = tokens.issue("alice", None).unwrap();
        directory.remove("alice");

        let resolver = SessionResolver::new(tokens, directory);
        let failure = resolver
            .resolve(&token.access_token, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure, SessionFailure::UnknownSubject);
        assert_eq!(Unauthenticated::from(failure), Unauthenticated);
    }

    #[tokio::test]
    async fn test_deactivated_after_issuance() {
        let directory = seeded_directory();
        let tokens = token_service();
        let token = tokens.issue("bob", None).unwrap();

        let resolver = SessionResolver::new(tokens, directory);
        let failure = resolver
            .resolve(&token.access_token, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure, SessionFailure::Inactive);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let tokens = token_service();
        let issued = Utc::now() - Duration::minutes(10);
        let token = tokens.issue_at("alice", Some(Duration::minutes(5)), issued).unwrap();

        let resolver = SessionResolver::new(tokens, seeded_directory());
        let failure = resolver
            .resolve(&token.access_token, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure, SessionFailure::Expired);
    }

    #[tokio::test]
    async fn test_bad_tokens() {
        let resolver = SessionResolver::new(token_service(), seeded_directory());
        let cancel = CancellationToken::new();

        assert_eq!(
            resolver.resolve("garbage", &cancel).await.unwrap_err(),
            SessionFailure::Malformed
        );

        let mut token = token_service().issue("alice", None).unwrap().access_token;
        let last = token.pop().unwrap();
        token.push(if last == 'x' { 'y' } else { 'x' });
        assert_eq!(
            resolver.resolve(&token, &cancel).await.unwrap_err(),
            SessionFailure::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_signature_checked_before_directory() {
        let directory = seeded_directory();
        directory.set_available(false);
        let resolver = SessionResolver::new(token_service(), directory);

        // A bad token is rejected without touching the (offline) directory
        assert_eq!(
            resolver.resolve("garbage", &CancellationToken::new()).await.unwrap_err(),
            SessionFailure::Malformed
        );
    }

    #[tokio::test]
    async fn test_directory_outage() {
        let directory = seeded_directory();
        let tokens = token_service();
        let token = tokens.issue("alice", None).unwrap();
        directory.set_available(false);

        let resolver = SessionResolver::new(tokens, directory);
        let failure = resolver
            .resolve(&token.access_token, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            failure,
            SessionFailure::DirectoryUnavailable(DirectoryError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_resolution() {
        let tokens = token_service();
        let token = tokens.issue("alice", None).unwrap();
        let resolver = SessionResolver::new(tokens, seeded_directory());

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            resolver.resolve(&token.access_token, &cancel).await.unwrap_err(),
            SessionFailure::Cancelled
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_login_resolve_and_removal() {
        let hasher = fast_hasher();
        let directory = seeded_directory();
        let usernames: Vec<String> = (0..8).map(|i| format!("user{}", i)).collect();
        for username in &usernames {
            directory.insert(UserRecord {
                username: username.clone(),
                email: None,
                password_hash: hasher.hash("correct").unwrap(),
                active: true,
            });
        }

        let tokens = token_service();
        let auth = Arc::new(
            AuthenticationService::new(directory.clone(), fast_hasher(), tokens.clone()).unwrap(),
        );
        let resolver = Arc::new(SessionResolver::new(tokens, directory.clone()));

        let mut sessions = Vec::new();
        for username in usernames.iter().cloned().chain(["alice".to_string()]) {
            let auth = auth.clone();
            let resolver = resolver.clone();
            sessions.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                let mut issued = Vec::new();
                for _ in 0..4 {
                    match auth.login(&username, "correct", &cancel).await {
                        Ok(token) => issued.push(token.access_token),
                        Err(failure) => assert_eq!(failure, AuthFailure::NotFound),
                    }
                    for token in &issued {
                        match resolver.resolve(token, &cancel).await {
                            Ok(user) => assert_eq!(user.username, username),
                            Err(failure) => assert_eq!(failure, SessionFailure::UnknownSubject),
                        }
                    }
                    tokio::task::yield_now().await;
                }
                (username, issued)
            }));
        }

        let mut removals = Vec::new();
        for username in usernames.iter().cloned() {
            let directory = directory.clone();
            removals.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                directory.remove(&username)
            }));
        }

        for removal in removals {
            assert!(removal.await.unwrap().is_some());
        }

        // Once every removal has landed, only alice's sessions still resolve
        let cancel = CancellationToken::new();
        for session in sessions {
            let (username, issued) = session.await.unwrap();
            for token in issued {
                let result = resolver.resolve(&token, &cancel).await;
                if username == "alice" {
                    assert_eq!(result.unwrap().username, "alice");
                } else {
                    assert_eq!(result.unwrap_err(), SessionFailure::UnknownSubject);
                }
            }
        }
    }
}
