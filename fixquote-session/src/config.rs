/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.
//!
//! This module provides configuration options for the quote session.

use fixquote_core::types::CompId;
use std::time::Duration;
use thiserror::Error;

/// Default BeginString.
pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.4";

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Largest HeartBtInt accepted from a Logon acknowledgement (one day).
pub const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors raised while assembling a [`SessionConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A CompID is empty or too long.
    #[error("invalid comp id for {field}: {value:?}")]
    InvalidCompId {
        /// Setting name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// What the session does when the counterparty violates the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Log the violation, report it, and keep the session up.
    #[default]
    Log,
    /// Report the violation and drop the session.
    Disconnect,
}

/// Configuration for a quote session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sender CompID (tag 49).
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56).
    pub target_comp_id: CompId,
    /// Protocol version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Username (tag 553) sent on Logon.
    pub username: String,
    /// Heartbeat interval (tag 108).
    pub heartbeat_interval: Duration,
    /// Whether Logon carries ResetSeqNumFlag=Y (tag 141).
    pub reset_seq_num_on_logon: bool,
    /// How long to wait for the Logon acknowledgement.
    pub logon_timeout: Duration,
    /// How long to wait for the counterparty's Logout after sending ours.
    pub logout_grace: Duration,
    /// Extra silence tolerated past the heartbeat interval before probing.
    pub test_request_grace: Duration,
    /// Whether to check BodyLength and CheckSum of every inbound frame.
    pub validate_inbound: bool,
    /// Reaction to protocol violations.
    pub violation_policy: ViolationPolicy,
    /// Maximum frame size in bytes.
    pub max_frame_size: usize,
}

impl SessionConfig {
    /// Creates a session configuration with defaults for everything but the
    /// CompIDs.
    ///
    /// The username defaults to the sender CompID.
    ///
    /// # Arguments
    /// * `sender_comp_id` - Our CompID
    /// * `target_comp_id` - The counterparty CompID
    #[must_use]
    pub fn new(sender_comp_id: CompId, target_comp_id: CompId) -> Self {
        Self {
            username: sender_comp_id.as_str().to_string(),
            sender_comp_id,
            target_comp_id,
            begin_string: DEFAULT_BEGIN_STRING.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reset_seq_num_on_logon: true,
            logon_timeout: Duration::from_secs(10),
            logout_grace: Duration::from_secs(2),
            test_request_grace: Duration::from_secs(1),
            validate_inbound: true,
            violation_policy: ViolationPolicy::Log,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the Logon username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout grace period.
    #[must_use]
    pub const fn with_logout_grace(mut self, grace: Duration) -> Self {
        self.logout_grace = grace;
        self
    }

    /// Sets the violation policy.
    #[must_use]
    pub const fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    /// Enables or disables inbound validation.
    #[must_use]
    pub const fn with_validate_inbound(mut self, validate: bool) -> Self {
        self.validate_inbound = validate;
        self
    }

    /// Returns the heartbeat interval in whole seconds, as sent in tag 108.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs().max(1)
    }

    /// Returns how often the driver should call `on_heartbeat_tick`.
    ///
    /// At most one second, so heartbeats and probes fire close to their
    /// deadline.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.heartbeat_interval
            .min(Duration::from_secs(1))
            .max(Duration::from_millis(10))
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<String>,
    target_comp_id: Option<String>,
    begin_string: Option<String>,
    username: Option<String>,
    heartbeat_interval: Option<Duration>,
    reset_seq_num_on_logon: Option<bool>,
    logon_timeout: Option<Duration>,
    logout_grace: Option<Duration>,
    test_request_grace: Option<Duration>,
    validate_inbound: Option<bool>,
    violation_policy: Option<ViolationPolicy>,
    max_frame_size: Option<usize>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: impl Into<String>) -> Self {
        self.sender_comp_id = Some(id.into());
        self
    }

    /// Sets the target CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: impl Into<String>) -> Self {
        self.target_comp_id = Some(id.into());
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the Logon username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether Logon asks for a sequence reset.
    #[must_use]
    pub const fn reset_seq_num_on_logon(mut self, reset: bool) -> Self {
        self.reset_seq_num_on_logon = Some(reset);
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = Some(timeout);
        self
    }

    /// Sets the logout grace period.
    #[must_use]
    pub const fn logout_grace(mut self, grace: Duration) -> Self {
        self.logout_grace = Some(grace);
        self
    }

    /// Sets the silence tolerated past the heartbeat interval before a
    /// TestRequest is sent.
    #[must_use]
    pub const fn test_request_grace(mut self, grace: Duration) -> Self {
        self.test_request_grace = Some(grace);
        self
    }

    /// Sets whether inbound frames are validated.
    #[must_use]
    pub const fn validate_inbound(mut self, validate: bool) -> Self {
        self.validate_inbound = Some(validate);
        self
    }

    /// Sets the violation policy.
    #[must_use]
    pub const fn violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = Some(policy);
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if a CompID is missing or invalid, or a
    /// duration or size is zero.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let sender = comp_id("sender_comp_id", self.sender_comp_id)?;
        let target = comp_id("target_comp_id", self.target_comp_id)?;

        let mut config = SessionConfig::new(sender, target);

        if let Some(begin_string) = self.begin_string {
            if begin_string.is_empty() || begin_string.contains('\x01') {
                return Err(ConfigError::InvalidValue {
                    field: "begin_string",
                    reason: format!("{begin_string:?} is not a valid BeginString"),
                });
            }
            config.begin_string = begin_string;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(interval) = self.heartbeat_interval {
            if interval < Duration::from_secs(1) {
                return Err(ConfigError::InvalidValue {
                    field: "heartbeat_interval",
                    reason: "must be at least one second".to_string(),
                });
            }
            config.heartbeat_interval = interval;
        }
        if let Some(reset) = self.reset_seq_num_on_logon {
            config.reset_seq_num_on_logon = reset;
        }
        if let Some(timeout) = self.logon_timeout {
            config.logon_timeout = non_zero("logon_timeout", timeout)?;
        }
        if let Some(grace) = self.logout_grace {
            config.logout_grace = non_zero("logout_grace", grace)?;
        }
        if let Some(grace) = self.test_request_grace {
            config.test_request_grace = grace;
        }
        if let Some(validate) = self.validate_inbound {
            config.validate_inbound = validate;
        }
        if let Some(policy) = self.violation_policy {
            config.violation_policy = policy;
        }
        if let Some(size) = self.max_frame_size {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "max_frame_size",
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.max_frame_size = size;
        }

        Ok(config)
    }
}

fn comp_id(field: &'static str, value: Option<String>) -> Result<CompId, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(field))?;
    CompId::new(&value).ok_or(ConfigError::InvalidCompId { field, value })
}

fn non_zero(field: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
