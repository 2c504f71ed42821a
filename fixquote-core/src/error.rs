/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the FixQuote client.
//!
//! Every layer owns one `thiserror` enum. All of them convert into the
//! top-level [`FixError`] so callers that do not care about the layer can
//! use the [`Result`] alias.

use crate::message::Discrepancy;
use crate::types::Phase;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FixQuote operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// A frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in the quote request workflow.
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),

    /// Error from the transport boundary.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential fetch failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that make a single frame undecodable.
///
/// BodyLength and CheckSum mismatches are deliberately not part of this enum:
/// they are reported as [`Discrepancy`] values by the validation step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame does not start with a BeginString field (tag 8).
    #[error("invalid begin string: frame must start with 8=")]
    InvalidBeginString,

    /// BodyLength (tag 9) is not the second field.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength (tag 9) is not a non-negative integer.
    #[error("invalid body length value: {value:?}")]
    InvalidBodyLength {
        /// The raw value found in the frame.
        value: String,
    },

    /// MsgType (tag 35) is absent.
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// CheckSum (tag 10) is absent.
    #[error("missing checksum field (tag 10)")]
    MissingChecksum,

    /// CheckSum (tag 10) is not exactly three decimal digits.
    #[error("invalid checksum value: {value:?}")]
    InvalidChecksum {
        /// The raw value found in the frame.
        value: String,
    },

    /// A `tag=value` segment could not be parsed.
    #[error("malformed field at offset {offset}")]
    MalformedField {
        /// Byte offset of the segment within the frame.
        offset: usize,
    },

    /// Bytes follow the CheckSum field.
    #[error("unexpected data after checksum at offset {offset}")]
    TrailingData {
        /// Byte offset of the first unexpected byte.
        offset: usize,
    },

    /// A field required by the caller is absent.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// A field value could not be converted to the requested type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Errors that occur while encoding a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Tag 0 is not a valid field tag.
    #[error("invalid tag: {tag}")]
    InvalidTag {
        /// The rejected tag number.
        tag: u32,
    },

    /// The value cannot be represented on the wire.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Protocol conformance problems detected by the session.
///
/// How they are handled depends on the configured violation policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A TestRequest we sent was not answered within one heartbeat interval.
    #[error("test request {test_req_id} unanswered after {elapsed_ms} ms")]
    UnansweredTestRequest {
        /// The TestReqID we sent.
        test_req_id: String,
        /// Time elapsed since the TestRequest was sent.
        elapsed_ms: u64,
    },

    /// A Heartbeat echoed a TestReqID we never sent.
    #[error("heartbeat echoed unknown test request id {test_req_id}")]
    UnexpectedTestReqId {
        /// The TestReqID carried by the Heartbeat.
        test_req_id: String,
    },

    /// The frame failed BodyLength or CheckSum validation.
    #[error("frame {msg_seq_num:?} failed validation: {discrepancies:?}")]
    InvalidFrame {
        /// MsgSeqNum of the offending frame, if it carried one.
        msg_seq_num: Option<u64>,
        /// Every mismatch found.
        discrepancies: Vec<Discrepancy>,
    },
}

/// Errors in session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// An application message was submitted outside `LoggedIn`.
    #[error("session is not logged in (phase {phase})")]
    NotLoggedIn {
        /// Phase at the time of the call.
        phase: Phase,
    },

    /// The operation is not permitted in the current phase.
    #[error("cannot {operation} in phase {phase}")]
    InvalidPhase {
        /// The rejected operation.
        operation: &'static str,
        /// Phase at the time of the call.
        phase: Phase,
    },

    /// The logon handshake failed.
    #[error("logon failed: {reason}")]
    LogonFailed {
        /// Why the handshake failed.
        reason: String,
    },

    /// The counterparty broke the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// The session ended while the operation was outstanding.
    #[error("session closed: {reason}")]
    SessionClosed {
        /// Why the session ended.
        reason: String,
    },

    /// An outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

/// Errors in the quote request workflow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// The session is not `LoggedIn`.
    #[error("cannot request quote: session is not logged in (phase {phase})")]
    NotLoggedIn {
        /// Phase at the time of the call.
        phase: Phase,
    },

    /// The request parameters failed validation.
    #[error("invalid quote request: {0}")]
    InvalidRequest(String),

    /// No matching response arrived before the deadline.
    #[error("quote request {correlation_id} timed out after {timeout_ms} ms")]
    Timeout {
        /// QuoteReqID of the request.
        correlation_id: String,
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// The counterparty rejected the request.
    #[error("quote request {correlation_id} rejected: {reason}")]
    Rejected {
        /// QuoteReqID of the request.
        correlation_id: String,
        /// Text (tag 58) from the QuoteRequestReject.
        reason: String,
    },

    /// The session ended before a response arrived.
    #[error("session closed before quote arrived: {reason}")]
    SessionClosed {
        /// Why the session ended.
        reason: String,
    },

    /// The request was accepted by the workflow but the session refused it.
    #[error("session error: {0}")]
    Session(String),
}

/// Errors from the transport boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote endpoint is unreachable.
    #[error("failed to connect to {addr}: {reason}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying failure.
        reason: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Address that was dialled.
        addr: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// A read or write failed on an established stream.
    #[error("transport i/o error: {0}")]
    Io(String),

    /// The stream was closed.
    #[error("transport closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors from the credential provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Client id or secret is empty.
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// The provider refused the credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or answered garbage.
    #[error("token provider unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::InvalidChecksum {
            value: "1x".to_string(),
        };
        assert_eq!(err.to_string(), "invalid checksum value: \"1x\"");
    }

    #[test]
    fn test_fix_error_from_decode() {
        let fix_err: FixError = DecodeError::MissingChecksum.into();
        assert!(matches!(
            fix_err,
            FixError::Decode(DecodeError::MissingChecksum)
        ));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotLoggedIn {
            phase: Phase::AwaitingLogonAck,
        };
        assert_eq!(
            err.to_string(),
            "session is not logged in (phase AWAITING_LOGON_ACK)"
        );
    }

    #[test]
    fn test_session_error_from_violation() {
        let violation = ProtocolViolation::UnexpectedTestReqId {
            test_req_id: "T1".to_string(),
        };
        let err: SessionError = violation.clone().into();
        assert_eq!(err, SessionError::ProtocolViolation(violation));
    }

    #[test]
    fn test_quote_error_display() {
        let err = QuoteError::Timeout {
            correlation_id: "q1".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(err.to_string(), "quote request q1 timed out after 500 ms");
    }

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = io.into();
        assert_eq!(err, TransportError::Io("pipe".to_string()));
    }
}
