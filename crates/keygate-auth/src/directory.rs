//! User directory abstraction

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keygate_db::{Database, User};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;

/// A user as seen by the authentication core (read-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            active: user.active,
        }
    }
}

/// Source of user records
///
/// Implementations must be safe to call concurrently. A lookup may be slow
/// or fail on its own; callers treat any error as the directory being
/// unavailable.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a single user by unique username
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, DirectoryError>;
}

#[async_trait]
impl UserDirectory for Database {
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let user = self.get_user_by_username(username).await?;
        Ok(user.map(UserRecord::from))
    }
}

/// Run a lookup that is abandoned as soon as `cancel` fires
///
/// Returns `None` when cancelled. The in-flight lookup future is dropped,
/// so nothing is left half-done.
pub(crate) async fn lookup_cancellable(
    directory: &dyn UserDirectory,
    username: &str,
    cancel: &CancellationToken,
) -> Option<Result<Option<UserRecord>, DirectoryError>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = directory.lookup(username) => Some(result),
    }
}

/// Directory held entirely in memory
///
/// Useful for embedding and tests. Can be switched to an unavailable state
/// to simulate an outage.
#[derive(Debug)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Insert or replace a user
    pub fn insert(&self, record: UserRecord) {
        self.users.write().insert(record.username.clone(), record);
    }

    /// Remove a user, returning the old record
    pub fn remove(&self, username: &str) -> Option<UserRecord> {
        self.users.write().remove(username)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, DirectoryError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }
        Ok(self.users.read().get(username).cloned())
    }
}
