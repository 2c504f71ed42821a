/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Frame decoder.
//!
//! Splits one complete frame into its ordered fields and builds a
//! [`WireMessage`]. Decoding fails only when the frame is structurally
//! unusable: no BeginString at offset 0, no BodyLength right after it, no
//! MsgType, or a missing or non-numeric CheckSum. Length and checksum
//! mismatches are left to [`crate::validate`].

use crate::checksum::parse_checksum;
use crate::encoder::SOH;
use bytes::Bytes;
use fixquote_core::error::DecodeError;
use fixquote_core::field::tags;
use fixquote_core::message::{MsgType, WireMessage};
use memchr::memchr;
use std::ops::Range;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// One field located by [`FieldScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedField {
    /// The field tag number.
    pub tag: u32,
    /// Offset of the first tag digit.
    pub start: usize,
    /// Range of the value bytes.
    pub value: Range<usize>,
}

/// Sequential `tag=value` scanner over a frame.
///
/// The last field may omit its trailing SOH, which is how CheckSum ends a
/// frame on the wire.
#[derive(Debug)]
pub struct FieldScanner<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> FieldScanner<'a> {
    /// Creates a scanner positioned at the start of `input`.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the bytes not yet scanned.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset..]
    }

    /// Scans the next field.
    ///
    /// # Returns
    /// `Ok(None)` when the buffer is exhausted.
    ///
    /// # Errors
    /// Returns `DecodeError::MalformedField` if the segment has no `=` or a
    /// non-numeric tag.
    pub fn next_field(&mut self) -> Result<Option<ScannedField>, DecodeError> {
        let remaining = self.remaining();
        if remaining.is_empty() {
            return Ok(None);
        }
        let start = self.offset;
        let malformed = DecodeError::MalformedField { offset: start };

        let eq_pos = memchr(EQUALS, remaining).ok_or_else(|| malformed.clone())?;
        let tag = parse_tag(&remaining[..eq_pos]).ok_or(malformed)?;

        let value_start = start + eq_pos + 1;
        let value_end = match memchr(SOH, &self.input[value_start..]) {
            Some(pos) => value_start + pos,
            None => self.input.len(),
        };
        self.offset = (value_end + 1).min(self.input.len());

        Ok(Some(ScannedField {
            tag,
            start,
            value: value_start..value_end,
        }))
    }
}

/// Decodes a frame, copying it into an owned buffer.
///
/// # Errors
/// Returns `DecodeError` if the frame is structurally malformed.
pub fn decode(input: &[u8]) -> Result<WireMessage, DecodeError> {
    decode_bytes(Bytes::copy_from_slice(input))
}

/// Decodes a frame without copying.
///
/// A single SOH after the CheckSum value is tolerated.
///
/// # Errors
/// Returns `DecodeError` if the frame is structurally malformed.
pub fn decode_bytes(frame: Bytes) -> Result<WireMessage, DecodeError> {
    if !frame.starts_with(b"8=") {
        return Err(DecodeError::InvalidBeginString);
    }

    let mut scanner = FieldScanner::new(&frame);
    let mut fields: Vec<(u32, Range<usize>)> = Vec::with_capacity(24);
    let mut checksum: Option<ScannedField> = None;

    while let Some(field) = scanner.next_field()? {
        fields.push((field.tag, field.value.clone()));
        if field.tag == tags::CHECK_SUM {
            checksum = Some(field);
            break;
        }
    }

    match fields.first() {
        Some((tags::BEGIN_STRING, value)) if !value.is_empty() => {}
        _ => return Err(DecodeError::InvalidBeginString),
    }

    let (declared_body_length, body_start) = match fields.get(1) {
        Some((tags::BODY_LENGTH, value)) => {
            let raw = &frame[value.clone()];
            let parsed = std::str::from_utf8(raw)
                .ok()
                .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| DecodeError::InvalidBodyLength {
                    value: String::from_utf8_lossy(raw).into_owned(),
                })?;
            (parsed, value.end + 1)
        }
        _ => return Err(DecodeError::MissingBodyLength),
    };

    let checksum = checksum.ok_or(DecodeError::MissingChecksum)?;
    let checksum_raw = &frame[checksum.value.clone()];
    let declared_checksum =
        parse_checksum(checksum_raw).ok_or_else(|| DecodeError::InvalidChecksum {
            value: String::from_utf8_lossy(checksum_raw).into_owned(),
        })?;

    let trailing = scanner.remaining();
    if !trailing.is_empty() && trailing != [SOH] {
        return Err(DecodeError::TrailingData {
            offset: scanner.offset(),
        });
    }

    let msg_type = fields
        .iter()
        .find(|(tag, _)| *tag == tags::MSG_TYPE)
        .and_then(|(_, value)| std::str::from_utf8(&frame[value.clone()]).ok())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<MsgType>().ok())
        .ok_or(DecodeError::MissingMsgType)?;

    let body = body_start..checksum.start;
    let frame_end = checksum.value.end;
    Ok(WireMessage::new(
        frame.slice(..frame_end),
        fields,
        msg_type,
        declared_body_length,
        body,
        declared_checksum,
    ))
}

/// Parses a tag number from ASCII digits.
///
/// # Returns
/// The parsed tag number, or `None` if empty, non-numeric or out of range.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}
