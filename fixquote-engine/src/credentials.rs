/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Credential boundary.
//!
//! The Logon carries a bearer token as Password (tag 554). Where the token
//! comes from is up to a [`TokenProvider`]; the client only asks for one per
//! connection.

use async_trait::async_trait;
use fixquote_core::error::AuthError;
use std::fmt;

/// OAuth-style client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client id.
    pub client_id: String,
    /// Client secret. Never logged.
    pub client_secret: String,
    /// Audience the token is requested for.
    pub audience: Option<String>,
}

impl ClientCredentials {
    /// Creates credentials without an audience.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: None,
        }
    }

    /// Sets the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Checks that id and secret are present.
    ///
    /// # Errors
    /// Returns `AuthError::MissingCredentials` naming the empty setting.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::MissingCredentials("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::MissingCredentials("client_secret"));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("audience", &self.audience)
            .finish()
    }
}

/// Exchanges client credentials for a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a token.
    ///
    /// # Errors
    /// Returns `AuthError` if the credentials are incomplete or refused, or
    /// the provider cannot be reached.
    async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<String, AuthError>;
}

/// Hands out a fixed token.
///
/// For counterparties that issue long-lived tokens out of band, and for
/// tests.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Creates a provider for `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"****")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<String, AuthError> {
        credentials.validate()?;
        if self.token.is_empty() {
            return Err(AuthError::Unavailable("no token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}
