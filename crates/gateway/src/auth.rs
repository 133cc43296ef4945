//! Credential extraction and the authorization seam.
//!
//! Handlers never decide whether a caller is allowed in. They collect
//! [`Credentials`] from the request and hand them to an [`AuthAuthority`].

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use protocol::WorkspaceQuery;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AuthConfig;

/// Header carrying the username alongside a bearer token.
pub const USERNAME_HEADER: &str = "x-username";

/// Credentials presented by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Access token.
    pub token: Option<String>,
    /// Username paired with the token.
    pub username: Option<String>,
}

impl Credentials {
    /// Collect credentials from headers, falling back to query parameters.
    ///
    /// `Authorization: Bearer <token>` and `X-Username` win over the `token`
    /// and `username` query parameters when both are present.
    pub fn from_request(headers: &HeaderMap, query: &WorkspaceQuery) -> Self {
        let header_token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);

        let header_username = headers
            .get(USERNAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            token: header_token.or_else(|| query.token.clone().filter(|t| !t.is_empty())),
            username: header_username.or_else(|| query.username.clone().filter(|u| !u.is_empty())),
        }
    }
}

/// Extract the token from an `Authorization: Bearer` value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// An authorized caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Username the caller presented, if any.
    pub username: Option<String>,
}

/// Reasons an authority rejects credentials.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no access token presented")]
    MissingToken,

    #[error("access token rejected")]
    InvalidToken,

    #[error("username does not match")]
    UsernameMismatch,
}

/// Decides whether presented credentials are valid.
#[async_trait]
pub trait AuthAuthority: Send + Sync {
    /// Authorize a caller.
    async fn authorize(&self, credentials: &Credentials) -> Result<Principal, AuthError>;
}

/// Authority backed by a single configured token and optional username.
#[derive(Clone)]
pub struct StaticTokenAuthority {
    token: String,
    username: Option<String>,
}

impl StaticTokenAuthority {
    /// Create an authority accepting `token`, and `username` when given.
    pub fn new(token: impl Into<String>, username: Option<String>) -> Self {
        Self {
            token: token.into(),
            username,
        }
    }

    /// Build from the `[auth]` config section.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.token.clone(), config.username.clone())
    }
}

impl std::fmt::Debug for StaticTokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuthority")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

#[async_trait]
impl AuthAuthority for StaticTokenAuthority {
    async fn authorize(&self, credentials: &Credentials) -> Result<Principal, AuthError> {
        let presented = credentials.token.as_deref().ok_or(AuthError::MissingToken)?;

        if self.token.is_empty() || !token_matches(presented, &self.token) {
            return Err(AuthError::InvalidToken);
        }

        if let Some(expected) = &self.username {
            if credentials.username.as_deref() != Some(expected.as_str()) {
                return Err(AuthError::UsernameMismatch);
            }
        }

        Ok(Principal {
            username: credentials.username.clone(),
        })
    }
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
