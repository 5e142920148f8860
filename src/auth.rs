//! Request authentication against Supabase Auth
//!
//! Clients send the Supabase access token as `Authorization: Bearer <jwt>`.
//! Instead of checking the JWT signature locally, the token is handed to
//! Supabase (`GET /auth/v1/user`), which answers with the user it belongs to.

use crate::error::PhilError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Identity of an authenticated caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Access token required")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication service unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for PhilError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingToken => PhilError::unauthorized(error.to_string()),
            AuthError::InvalidToken => PhilError::forbidden(error.to_string()),
            AuthError::Unavailable(_) => PhilError::internal(error.to_string()),
        }
    }
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to the user it was issued to
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;

    /// Whether requests without a token are rejected
    fn requires_token(&self) -> bool {
        true
    }

    /// Identity used for requests when no token is required
    fn anonymous(&self) -> Option<AuthUser> {
        None
    }
}

/// Extract the token from an `Authorization` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Authenticate a request from its `Authorization` header
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    header: Option<&str>,
) -> Result<AuthUser, AuthError> {
    let token = header.and_then(bearer_token);

    match token {
        Some(token) => verifier.verify(token).await,
        None if !verifier.requires_token() => {
            verifier.anonymous().ok_or(AuthError::MissingToken)
        }
        None => Err(AuthError::MissingToken),
    }
}

/// Verifies tokens with the Supabase Auth server
pub struct SupabaseVerifier {
    client: Client,
    user_url: String,
    api_key: String,
}

impl SupabaseVerifier {
    pub fn new(url: &str, api_key: String, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            user_url: format!("{}/auth/v1/user", url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl TokenVerifier for SupabaseVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!("Supabase auth request failed: {}", e);
                AuthError::Unavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {
                let user = response.json::<AuthUser>().await.map_err(|e| {
                    warn!("Unreadable Supabase user payload: {}", e);
                    AuthError::InvalidToken
                })?;
                debug!("Authenticated user {}", user.id);
                Ok(user)
            }
            status if status.is_server_error() => {
                Err(AuthError::Unavailable(format!("Supabase auth returned {status}")))
            }
            status => {
                debug!("Token rejected by Supabase auth: {}", status);
                Err(AuthError::InvalidToken)
            }
        }
    }
}

/// Accepts every request as a fixed local developer (`auth.enabled = false`)
pub struct DisabledVerifier {
    user: AuthUser,
}

impl DisabledVerifier {
    pub fn new() -> Self {
        Self {
            user: AuthUser {
                id: "local-developer".to_string(),
                email: "developer@localhost".to_string(),
            },
        }
    }
}

impl Default for DisabledVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenVerifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<AuthUser, AuthError> {
        Ok(self.user.clone())
    }

    fn requires_token(&self) -> bool {
        false
    }

    fn anonymous(&self) -> Option<AuthUser> {
        Some(self.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::StatusCode as HttpStatus;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn test_disabled_verifier_accepts_missing_token() {
        let verifier = DisabledVerifier::new();
        let user = authenticate(&verifier, None).await.unwrap();
        assert_eq!(user.id, "local-developer");
    }

    #[tokio::test]
    async fn test_missing_token_maps_to_401() {
        let verifier = crate::testing::mocks::StaticTokenVerifier::new();
        let error = authenticate(&verifier, Some("Basic xyz")).await.unwrap_err();

        let phil_error = PhilError::from(error);
        assert_eq!(phil_error.status_code(), HttpStatus::UNAUTHORIZED);
        assert_eq!(phil_error.to_body().message, "Access token required");
    }

    #[tokio::test]
    async fn test_rejected_token_maps_to_403() {
        let verifier = crate::testing::mocks::StaticTokenVerifier::new();
        let error = authenticate(&verifier, Some("Bearer nope"))
            .await
            .unwrap_err();

        let phil_error = PhilError::from(error);
        assert_eq!(phil_error.status_code(), HttpStatus::FORBIDDEN);
        assert_eq!(phil_error.to_body().message, "Invalid or expired token");
    }
}
