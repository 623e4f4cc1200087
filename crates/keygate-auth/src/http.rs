//! Axum integration: bearer token extraction

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::directory::UserRecord;
use crate::error::Unauthenticated;
use crate::resolver::SessionResolver;

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// The scheme is matched case-insensitively and may be followed by any
/// whitespace.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Extractor for the authenticated, active caller
///
/// Pulls the bearer token out of the request and hands it to the
/// [`SessionResolver`] held in application state.
pub struct CurrentUser(pub UserRecord);

impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<SessionResolver>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resolver = Arc::<SessionResolver>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| {
                debug!("Missing or malformed bearer token");
                Unauthenticated
            })?;

        // Dropping the request drops this future, which abandons the lookup
        let cancel = CancellationToken::new();
        let user = resolver.resolve(token, &cancel).await?;

        Ok(CurrentUser(user))
    }
}
