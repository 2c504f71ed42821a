/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Client builder for fluent configuration.
//!
//! This module provides a builder API for configuring a [`crate::QuoteClient`].

use crate::credentials::ClientCredentials;
use fixquote_quote::QuoteConfig;
use fixquote_session::{ConfigError, SessionConfig};
use std::time::Duration;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the client event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Everything a [`crate::QuoteClient`] needs to connect.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Counterparty host.
    pub host: String,
    /// Counterparty port.
    pub port: u16,
    /// Bound on establishing the transport.
    pub connect_timeout: Duration,
    /// Whether to set `TCP_NODELAY`.
    pub nodelay: bool,
    /// Credentials exchanged for the Logon token.
    pub credentials: ClientCredentials,
    /// Session settings.
    pub session: SessionConfig,
    /// Quote workflow settings.
    pub quote: QuoteConfig,
    /// Capacity of the [`crate::ClientEvent`] broadcast channel.
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for a [`ClientConfig`].
#[derive(Debug)]
pub struct ClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    connect_timeout: Duration,
    nodelay: bool,
    credentials: Option<ClientCredentials>,
    session: Option<SessionConfig>,
    quote: QuoteConfig,
    event_capacity: usize,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Creates a new client builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: None,
            port: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
            credentials: None,
            session: None,
            quote: QuoteConfig::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the counterparty address.
    #[must_use]
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the session configuration.
    #[must_use]
    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.session = Some(config);
        self
    }

    /// Sets the quote workflow configuration.
    #[must_use]
    pub fn with_quote_config(mut self, config: QuoteConfig) -> Self {
        self.quote = config;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables or disables `TCP_NODELAY`.
    #[must_use]
    pub const fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the session configuration, if set.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionConfig> {
        self.session.as_ref()
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` if the endpoint, credentials or session
    /// configuration was not provided, and `ConfigError::InvalidValue` for
    /// an empty host, port 0, or a zero timeout or capacity.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let host = self.host.ok_or(ConfigError::Missing("host"))?;
        if host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        let port = self.port.ok_or(ConfigError::Missing("port"))?;
        if port == 0 {
            return Err(invalid("port", "must not be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout", "must not be zero"));
        }
        if self.quote.quote_timeout.is_zero() {
            return Err(invalid("quote_timeout", "must not be zero"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must not be zero"));
        }
        Ok(ClientConfig {
            host,
            port,
            connect_timeout: self.connect_timeout,
            nodelay: self.nodelay,
            credentials: self.credentials.ok_or(ConfigError::Missing("credentials"))?,
            session: self.session.ok_or(ConfigError::Missing("session"))?,
            quote: self.quote,
            event_capacity: self.event_capacity,
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixquote_core::types::CompId;

    fn session() -> SessionConfig {
        SessionConfig::new(CompId::new("C1").unwrap(), CompId::new("STS").unwrap())
    }

    fn complete() -> ClientBuilder {
        ClientBuilder::new()
            .with_endpoint("fix.example.net", 9443)
            .with_credentials(ClientCredentials::new("C1", "s3cret"))
            .with_session(session())
    }

    #[test]
    fn test_client_builder_default() {
        let builder = ClientBuilder::new();
        assert_eq!(builder.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(builder.session().is_none());
    }

    #[test]
    fn test_client_builder_complete() {
        let config = complete()
            .with_connect_timeout(Duration::from_secs(3))
            .with_quote_config(QuoteConfig::new().with_account("acct-1"))
            .build()
            .unwrap();

        assert_eq!(config.addr(), "fix.example.net:9443");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(config.nodelay);
        assert_eq!(config.quote.account.as_deref(), Some("acct-1"));
        assert_eq!(config.session.target_comp_id.as_str(), "STS");
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_client_builder_missing() {
        assert_eq!(
            ClientBuilder::new().build().unwrap_err(),
            ConfigError::Missing("host")
        );
        assert_eq!(
            ClientBuilder::new()
                .with_endpoint("h", 1)
                .with_session(session())
                .build()
                .unwrap_err(),
            ConfigError::Missing("credentials")
        );
        assert_eq!(
            ClientBuilder::new()
                .with_endpoint("h", 1)
                .with_credentials(ClientCredentials::new("C1", "s"))
                .build()
                .unwrap_err(),
            ConfigError::Missing("session")
        );
    }

    #[test]
    fn test_client_builder_invalid() {
        assert!(matches!(
            complete().with_endpoint("h", 0).build(),
            Err(ConfigError::InvalidValue { field: "port", .. })
        ));
        assert!(matches!(
            complete().with_connect_timeout(Duration::ZERO).build(),
            Err(ConfigError::InvalidValue {
                field: "connect_timeout",
                ..
            })
        ));
        assert!(matches!(
            complete()
                .with_quote_config(QuoteConfig::new().with_quote_timeout(Duration::ZERO))
                .build(),
            Err(ConfigError::InvalidValue {
                field: "quote_timeout",
                ..
            })
        ));
    }
}
