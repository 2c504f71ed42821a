/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Events reported by the session state machine.

use fixquote_core::error::{ProtocolViolation, SessionError};
use fixquote_core::field::tags;
use fixquote_core::message::{MsgType, WireMessage};
use fixquote_core::types::Phase;
use std::fmt;
use std::time::Duration;

/// Something the caller of the state machine must react to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The phase changed.
    PhaseChanged {
        /// Phase before the change.
        from: Phase,
        /// Phase after the change.
        to: Phase,
    },
    /// The counterparty acknowledged our Logon; heartbeats are due every
    /// `heartbeat_interval` from now on.
    LoggedOn {
        /// Negotiated heartbeat interval.
        heartbeat_interval: Duration,
    },
    /// The counterparty rejected one of our messages at session level.
    RejectReceived(RejectNotice),
    /// An application message (quote, quote reject, anything non-admin).
    Application(WireMessage),
    /// The counterparty broke the protocol.
    Violation(ProtocolViolation),
    /// The session is over; the transport should be closed once the outbox
    /// is flushed.
    Terminated(DisconnectReason),
}

/// Why a session reached `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We logged out and the counterparty confirmed.
    LogoutCompleted,
    /// The counterparty logged out.
    RemoteLogout {
        /// Text (tag 58) of the counterparty's Logout.
        text: Option<String>,
    },
    /// We gave up before the handshake completed.
    Aborted,
    /// The Logon handshake failed.
    LogonFailed(String),
    /// No Logon acknowledgement arrived in time.
    LogonTimeout,
    /// Our Logout was not confirmed within the grace period.
    LogoutGraceExpired,
    /// The session was dropped under [`crate::ViolationPolicy::Disconnect`].
    Violation(ProtocolViolation),
    /// The transport reached end of stream.
    TransportClosed,
    /// The transport failed.
    TransportError(String),
}

impl DisconnectReason {
    /// Returns true for the orderly endings.
    #[must_use]
    pub const fn is_graceful(&self) -> bool {
        matches!(
            self,
            Self::LogoutCompleted | Self::RemoteLogout { .. } | Self::LogoutGraceExpired
        )
    }

    /// Converts the reason into the error reported to callers still waiting
    /// on the session.
    #[must_use]
    pub fn to_error(&self) -> SessionError {
        match self {
            Self::LogonFailed(reason) => SessionError::LogonFailed {
                reason: reason.clone(),
            },
            Self::LogonTimeout => SessionError::LogonFailed {
                reason: "logon acknowledgement timed out".to_string(),
            },
            Self::Violation(violation) => SessionError::ProtocolViolation(violation.clone()),
            other => SessionError::SessionClosed {
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogoutCompleted => f.write_str("logout completed"),
            Self::RemoteLogout { text: Some(text) } => write!(f, "counterparty logged out: {text}"),
            Self::RemoteLogout { text: None } => f.write_str("counterparty logged out"),
            Self::Aborted => f.write_str("aborted before logon"),
            Self::LogonFailed(reason) => write!(f, "logon failed: {reason}"),
            Self::LogonTimeout => f.write_str("logon timed out"),
            Self::LogoutGraceExpired => f.write_str("logout not confirmed within grace period"),
            Self::Violation(violation) => write!(f, "protocol violation: {violation}"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::TransportError(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

/// A session-level Reject(3) from the counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RejectNotice {
    /// MsgSeqNum of the rejected message (tag 45).
    pub ref_seq_num: Option<u64>,
    /// Tag that caused the reject (tag 371).
    pub ref_tag_id: Option<u32>,
    /// MsgType of the rejected message (tag 372).
    pub ref_msg_type: Option<MsgType>,
    /// SessionRejectReason code (tag 373).
    pub reason_code: Option<u32>,
    /// Free text (tag 58).
    pub text: Option<String>,
}

impl RejectNotice {
    /// Extracts the reject details from a Reject(3) frame.
    ///
    /// Fields that are absent or unparseable are left empty.
    #[must_use]
    pub fn from_message(msg: &WireMessage) -> Self {
        Self {
            ref_seq_num: msg.get_as(tags::REF_SEQ_NUM).ok(),
            ref_tag_id: msg.get_as(tags::REF_TAG_ID).ok(),
            ref_msg_type: msg.get_as(tags::REF_MSG_TYPE).ok(),
            reason_code: msg.get_as(tags::SESSION_REJECT_REASON).ok(),
            text: msg.get(tags::TEXT).map(str::to_string),
        }
    }
}

impl fmt::Display for RejectNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("reject")?;
        if let Some(seq) = self.ref_seq_num {
            write!(f, " of seq {seq}")?;
        }
        if let Some(msg_type) = &self.ref_msg_type {
            write!(f, " ({msg_type})")?;
        }
        if let Some(tag) = self.ref_tag_id {
            write!(f, " tag {tag}")?;
        }
        if let Some(code) = self.reason_code {
            write!(f, " reason {code}")?;
        }
        if let Some(text) = &self.text {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}
