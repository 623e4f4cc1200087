//! Authentication error types

use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Invalid or missing startup configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Token signing secret is missing or empty")]
    MissingSecret,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token lifetime must be positive, got {0} minutes")]
    InvalidLifetime(i64),

    #[error("Invalid password hashing parameters: {0}")]
    InvalidHashing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password cannot be encoded: {0}")]
    Encoding(String),

    #[error("Password hashing error: {0}")]
    Hash(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token subject cannot be empty")]
    EmptySubject,

    #[error("Token lifetime must be at least one second")]
    InvalidLifetime,

    #[error("Token signing error: {0}")]
    Signing(String),
}

impl TokenError {
    /// Classify a decoding failure
    pub(crate) fn from_decode(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

impl From<keygate_db::DbError> for DirectoryError {
    fn from(err: keygate_db::DbError) -> Self {
        DirectoryError::Unavailable(err.to_string())
    }
}

/// Why a login attempt failed
///
/// The distinction is kept for logs only; see [`LoginRejection`] for what
/// callers outside the core get to see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("User not found")]
    NotFound,

    #[error("Password does not match")]
    BadPassword,

    #[error("User is inactive")]
    Inactive,

    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Token issuance failed: {0}")]
    Token(#[from] TokenError),
}

impl AuthFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthFailure::NotFound => "not_found",
            AuthFailure::BadPassword => "bad_password",
            AuthFailure::Inactive => "inactive",
            AuthFailure::DirectoryUnavailable(_) => "directory_unavailable",
            AuthFailure::Cancelled => "cancelled",
            AuthFailure::Token(_) => "token_issue",
        }
    }
}

/// Why a bearer token could not be resolved to a user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token subject no longer exists")]
    UnknownSubject,

    #[error("User is inactive")]
    Inactive,

    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),

    #[error("Request cancelled")]
    Cancelled,
}

impl SessionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionFailure::InvalidSignature => "invalid_signature",
            SessionFailure::Expired => "expired",
            SessionFailure::Malformed => "malformed",
            SessionFailure::UnknownSubject => "unknown_subject",
            SessionFailure::Inactive => "inactive",
            SessionFailure::DirectoryUnavailable(_) => "directory_unavailable",
            SessionFailure::Cancelled => "cancelled",
        }
    }
}

impl From<TokenError> for SessionFailure {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature => SessionFailure::InvalidSignature,
            TokenError::Expired => SessionFailure::Expired,
            // Issuance-side errors cannot come out of verification
            TokenError::Malformed
            | TokenError::EmptySubject
            | TokenError::InvalidLifetime
            | TokenError::Signing(_) => SessionFailure::Malformed,
        }
    }
}

/// Login outcome as seen from outside the core
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRejection {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Authentication temporarily unavailable")]
    Unavailable,
}

impl From<AuthFailure> for LoginRejection {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::NotFound | AuthFailure::BadPassword | AuthFailure::Inactive => {
                LoginRejection::InvalidCredentials
            }
            AuthFailure::DirectoryUnavailable(_) | AuthFailure::Cancelled | AuthFailure::Token(_) => {
                LoginRejection::Unavailable
            }
        }
    }
}

/// Session outcome as seen from outside the core
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Could not validate credentials")]
pub struct Unauthenticated;

impl From<SessionFailure> for Unauthenticated {
    fn from(_: SessionFailure) -> Self {
        Unauthenticated
    }
}

fn rejection_response(status: StatusCode, message: &str) -> Response {
    let body = axum::Json(json!({
        "error": message
    }));

    if status == StatusCode::UNAUTHORIZED {
        (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
    } else {
        (status, body).into_response()
    }
}

impl IntoResponse for LoginRejection {
    fn into_response(self) -> Response {
        let status = match self {
            LoginRejection::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LoginRejection::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        rejection_response(status, &self.to_string())
    }
}

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        rejection_response(StatusCode::UNAUTHORIZED, &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_failures_collapse() {
        assert_eq!(LoginRejection::from(AuthFailure::NotFound), LoginRejection::InvalidCredentials);
        assert_eq!(LoginRejection::from(AuthFailure::BadPassword), LoginRejection::InvalidCredentials);
        assert_eq!(LoginRejection::from(AuthFailure::Inactive), LoginRejection::InvalidCredentials);
        assert_eq!(
            LoginRejection::from(AuthFailure::DirectoryUnavailable(DirectoryError::Unavailable(
                "down".to_string()
            ))),
            LoginRejection::Unavailable
        );
        assert_eq!(LoginRejection::from(AuthFailure::Cancelled), LoginRejection::Unavailable);
    }

    #[test]
    fn test_rejection_messages_hide_failure_kind() {
        let not_found = LoginRejection::from(AuthFailure::NotFound).to_string();
        let bad_password = LoginRejection::from(AuthFailure::BadPassword).to_string();
        assert_eq!(not_found, bad_password);

        let expired = Unauthenticated::from(SessionFailure::Expired).to_string();
        let unknown = Unauthenticated::from(SessionFailure::UnknownSubject).to_string();
        assert_eq!(expired, unknown);
    }

    #[test]
    fn test_token_errors_map_to_session_failures() {
        assert_eq!(SessionFailure::from(TokenError::InvalidSignature), SessionFailure::InvalidSignature);
        assert_eq!(SessionFailure::from(TokenError::Expired), SessionFailure::Expired);
        assert_eq!(SessionFailure::from(TokenError::Malformed), SessionFailure::Malformed);
    }

    #[test]
    fn test_unauthenticated_response() {
        let response = Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let response = LoginRejection::Unavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
