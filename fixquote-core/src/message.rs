/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message types and the decoded wire message.
//!
//! This module provides:
//! - [`MsgType`]: The message types the quote client understands
//! - [`WireMessage`]: An owned, decoded frame with an ordered field list and
//!   a tag index built once per frame
//! - [`Discrepancy`]: A BodyLength or CheckSum mismatch found by validation
//! - [`render_frame`]: Log-safe rendering of raw frames

use crate::error::DecodeError;
use crate::field::{FieldRef, tags};
use crate::types::SeqNum;
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Message types exchanged by the quote client.
///
/// Anything else is carried as `Custom(String)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0) - Session level.
    #[default]
    Heartbeat,
    /// Test Request (1) - Session level.
    TestRequest,
    /// Resend Request (2) - Session level.
    ResendRequest,
    /// Reject (3) - Session level.
    Reject,
    /// Sequence Reset (4) - Session level.
    SequenceReset,
    /// Logout (5) - Session level.
    Logout,
    /// Logon (A) - Session level.
    Logon,
    /// Quote Request (R).
    QuoteRequest,
    /// Quote (S).
    Quote,
    /// Quote Cancel (Z).
    QuoteCancel,
    /// Quote Request Reject (AG).
    QuoteRequestReject,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// Custom or unknown message type.
    Custom(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    /// Creates a MsgType from a string value.
    ///
    /// # Arguments
    /// * `s` - The message type string (e.g., "S" for Quote)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            "R" => Self::QuoteRequest,
            "S" => Self::Quote,
            "Z" => Self::QuoteCancel,
            "AG" => Self::QuoteRequestReject,
            "j" => Self::BusinessMessageReject,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the string representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::QuoteRequest => "R",
            Self::Quote => "S",
            Self::QuoteCancel => "Z",
            Self::QuoteRequestReject => "AG",
            Self::BusinessMessageReject => "j",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Returns true if this is an application message.
    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A mismatch between a declared and a recomputed frame property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discrepancy {
    /// Declared BodyLength differs from the measured byte count.
    BodyLength {
        /// Value of tag 9.
        declared: usize,
        /// Bytes between the BodyLength delimiter and `10=`.
        actual: usize,
    },
    /// Declared CheckSum differs from the recomputed sum.
    CheckSum {
        /// Value of tag 10.
        declared: u8,
        /// Sum of bytes before `10=`, modulo 256.
        calculated: u8,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyLength { declared, actual } => {
                write!(f, "body length declared {declared}, actual {actual}")
            }
            Self::CheckSum {
                declared,
                calculated,
            } => write!(
                f,
                "checksum declared {declared:03}, calculated {calculated:03}"
            ),
        }
    }
}

/// Position of one field inside [`WireMessage::as_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpan {
    tag: u32,
    value: Range<usize>,
}

/// A decoded frame.
///
/// Owns the raw bytes and keeps every field, duplicates included, in wire
/// order. A tag index (tag to positions) is built once at construction, so
/// accessors never rescan the frame.
#[derive(Debug, Clone)]
pub struct WireMessage {
    raw: Bytes,
    fields: Vec<FieldSpan>,
    index: HashMap<u32, SmallVec<[usize; 2]>>,
    msg_type: MsgType,
    declared_body_length: usize,
    body: Range<usize>,
    declared_checksum: u8,
}

impl WireMessage {
    /// Assembles a decoded frame.
    ///
    /// Called by the tag-value decoder once the frame has been split into
    /// fields; `fields` holds `(tag, value range)` pairs into `raw`.
    ///
    /// # Arguments
    /// * `raw` - The complete frame, `8=` through the CheckSum value
    /// * `fields` - Every field in wire order, header and trailer included
    /// * `msg_type` - The parsed MsgType
    /// * `declared_body_length` - The value of tag 9
    /// * `body` - Byte range from after the BodyLength delimiter to `10=`
    /// * `declared_checksum` - The value of tag 10
    #[must_use]
    pub fn new(
        raw: Bytes,
        fields: Vec<(u32, Range<usize>)>,
        msg_type: MsgType,
        declared_body_length: usize,
        body: Range<usize>,
        declared_checksum: u8,
    ) -> Self {
        let mut index: HashMap<u32, SmallVec<[usize; 2]>> = HashMap::with_capacity(fields.len());
        let fields: Vec<FieldSpan> = fields
            .into_iter()
            .enumerate()
            .map(|(pos, (tag, value))| {
                index.entry(tag).or_default().push(pos);
                FieldSpan { tag, value }
            })
            .collect();

        Self {
            raw,
            fields,
            index,
            msg_type,
            declared_body_length,
            body,
            declared_checksum,
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns the raw frame bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the raw frame as cheaply clonable bytes.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }

    /// Returns the value of tag 9 as declared in the frame.
    #[inline]
    #[must_use]
    pub const fn declared_body_length(&self) -> usize {
        self.declared_body_length
    }

    /// Returns the value of tag 10 as declared in the frame.
    #[inline]
    #[must_use]
    pub const fn declared_checksum(&self) -> u8 {
        self.declared_checksum
    }

    /// Returns the byte range BodyLength is supposed to measure.
    #[inline]
    #[must_use]
    pub fn body_range(&self) -> Range<usize> {
        self.body.clone()
    }

    /// Returns the offset of `10=` in the frame.
    #[inline]
    #[must_use]
    pub const fn checksum_offset(&self) -> usize {
        self.body.end
    }

    /// Returns the number of fields, header and trailer included.
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns an iterator over all fields in wire order.
    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        self.fields
            .iter()
            .map(|span| FieldRef::new(span.tag, &self.raw[span.value.clone()]))
    }

    /// Returns the body fields: everything after the standard header and
    /// before the CheckSum, in wire order.
    pub fn body_fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        let start = self
            .fields
            .iter()
            .position(|span| !tags::is_header(span.tag))
            .unwrap_or(self.fields.len());
        self.fields()
            .skip(start)
            .filter(|field| field.tag != tags::CHECK_SUM)
    }

    /// Returns true if the frame carries `tag` at least once.
    #[inline]
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.index.contains_key(&tag)
    }

    /// Gets the first occurrence of a field.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<FieldRef<'_>> {
        let pos = *self.index.get(&tag)?.first()?;
        let span = &self.fields[pos];
        Some(FieldRef::new(span.tag, &self.raw[span.value.clone()]))
    }

    /// Gets the first occurrence of a field as a string.
    ///
    /// # Returns
    /// The value, or `None` if absent or not valid UTF-8.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.field(tag).and_then(|f| f.as_str().ok())
    }

    /// Returns every occurrence of `tag`, in wire order.
    pub fn get_all(&self, tag: u32) -> impl Iterator<Item = &str> {
        self.index
            .get(&tag)
            .into_iter()
            .flat_map(|positions| positions.iter())
            .filter_map(|&pos| std::str::from_utf8(&self.raw[self.fields[pos].value.clone()]).ok())
    }

    /// Gets a field value parsed as the specified type.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is not found or cannot be parsed.
    pub fn get_as<T: std::str::FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        self.field(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })?
            .parse()
    }

    /// Gets a field value as a decimal, if present and well formed.
    #[must_use]
    pub fn get_decimal(&self, tag: u32) -> Option<Decimal> {
        self.field(tag).and_then(|f| f.as_decimal().ok())
    }

    /// Returns the BeginString value.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        self.get(tags::BEGIN_STRING).unwrap_or("")
    }

    /// Returns MsgSeqNum, if present and numeric.
    #[must_use]
    pub fn seq_num(&self) -> Option<SeqNum> {
        self.get_as::<u64>(tags::MSG_SEQ_NUM).ok().map(SeqNum::new)
    }

    /// Returns SenderCompID, if present.
    #[must_use]
    pub fn sender_comp_id(&self) -> Option<&str> {
        self.get(tags::SENDER_COMP_ID)
    }

    /// Returns TargetCompID, if present.
    #[must_use]
    pub fn target_comp_id(&self) -> Option<&str> {
        self.get(tags::TARGET_COMP_ID)
    }

    /// Returns SendingTime as sent, if present.
    #[must_use]
    pub fn sending_time(&self) -> Option<&str> {
        self.get(tags::SENDING_TIME)
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_frame(&self.raw))
    }
}

/// Renders a raw frame for logs.
///
/// SOH delimiters become `|` and the Password field (554) is masked.
#[must_use]
pub fn render_frame(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, segment) in raw.split(|&b| b == 0x01).enumerate() {
        if i > 0 {
            out.push('|');
        }
        if segment.starts_with(b"554=") {
            out.push_str("554=***");
        } else {
            out.push_str(&String::from_utf8_lossy(segment));
        }
    }
    out
}
