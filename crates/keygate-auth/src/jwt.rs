//! JWT token management

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TokenConfig;
use crate::error::{ConfigError, TokenError};

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// A freshly issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies stateless session tokens
///
/// Validity is decided entirely by the signature and the `exp` claim;
/// nothing is stored server-side.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_lifetime: Duration,
}

impl TokenService {
    /// Create a token service from validated configuration
    pub fn new(config: &TokenConfig) -> Result<Self, ConfigError> {
        let algorithm = config.validate()?;
        let secret = config.secret.as_bytes();

        let mut validation = Validation::new(algorithm);
        // Expiry is checked by hand against an explicit instant, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            default_lifetime: Duration::minutes(config.lifetime_minutes),
        })
    }

    /// Issue a token for `subject`, valid for `expires_in` or the default lifetime
    pub fn issue(&self, subject: &str, expires_in: Option<Duration>) -> Result<SessionToken, TokenError> {
        self.issue_at(subject, expires_in, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        subject: &str,
        expires_in: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::EmptySubject);
        }

        // `exp` is a whole number of seconds, so sub-second lifetimes are rejected too
        let lifetime_secs = expires_in.unwrap_or(self.default_lifetime).num_seconds();
        if lifetime_secs <= 0 {
            return Err(TokenError::InvalidLifetime);
        }

        let iat = now.timestamp();
        let exp = iat
            .checked_add(lifetime_secs)
            .ok_or(TokenError::InvalidLifetime)?;
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(TokenError::InvalidLifetime)?;

        let claims = Claims {
            sub: subject.to_string(),
            exp,
            iat: Some(iat),
        };

        debug!("Issuing token for user: {}", subject);

        let access_token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(SessionToken {
            access_token,
            token_type: "bearer",
            expires_at,
        })
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`
    ///
    /// The signature is checked before the claims, so a forged token never
    /// reports `Expired`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(TokenError::from_decode)?;
        let claims = token_data.claims;

        if claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
