/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Frame encoder.
//!
//! [`Encoder`] appends `tag=value` fields to a body buffer and wraps it with
//! BeginString, BodyLength and CheckSum. [`MessageEncoder`] adds the
//! standard header for one session (MsgType, MsgSeqNum, SenderCompID,
//! TargetCompID, SendingTime) in front of caller supplied body fields.
//!
//! Output layout:
//!
//! ```text
//! 8=<BeginString>|9=<BodyLength>|35=..|34=..|49=..|56=..|52=..|<body>10=<ddd>
//! ```
//!
//! There is no delimiter after the CheckSum value.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, Bytes, BytesMut};
use fixquote_core::error::EncodeError;
use fixquote_core::field::{Field, tags};
use fixquote_core::message::MsgType;
use fixquote_core::types::{CompId, SeqNum, Timestamp};

/// SOH (Start of Header) field delimiter.
pub const SOH: u8 = 0x01;

/// Low-level frame builder.
///
/// Everything appended becomes part of the body measured by BodyLength.
#[derive(Debug)]
pub struct Encoder<'a> {
    /// Bytes between the BodyLength delimiter and `10=`.
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.4").
    begin_string: &'a str,
}

impl<'a> Encoder<'a> {
    /// Creates a new encoder with the specified BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The protocol version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(begin_string: &'a str) -> Self {
        Self::with_capacity(begin_string, 256)
    }

    /// Creates a new encoder with pre-allocated body capacity.
    #[must_use]
    pub fn with_capacity(begin_string: &'a str, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string,
        }
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field after checking that it can be represented on the wire.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidTag` for tag 0 and
    /// `EncodeError::InvalidFieldValue` if the value contains SOH.
    pub fn try_put(&mut self, tag: u32, value: &str) -> Result<(), EncodeError> {
        check_field(tag, value)?;
        self.put_str(tag, value);
        Ok(())
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Finalizes the frame.
    ///
    /// Prepends BeginString and BodyLength (the measured length of the body
    /// buffer) and appends the CheckSum computed over every preceding byte.
    #[must_use]
    pub fn finish(self) -> Bytes {
        let body_len = self.body.len();
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);

        let mut frame =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + body_len + 16);
        frame.put_slice(b"8=");
        frame.put_slice(self.begin_string.as_bytes());
        frame.put_u8(SOH);
        frame.put_slice(b"9=");
        frame.put_slice(len_str.as_bytes());
        frame.put_u8(SOH);
        frame.put_slice(&self.body);

        let checksum = calculate_checksum(&frame);
        frame.put_slice(b"10=");
        frame.put_slice(&format_checksum(checksum));

        frame.freeze()
    }
}

/// Checks that a field can be written without corrupting the frame.
fn check_field(tag: u32, value: &str) -> Result<(), EncodeError> {
    if tag == 0 {
        return Err(EncodeError::InvalidTag { tag });
    }
    if value.as_bytes().contains(&SOH) {
        return Err(EncodeError::InvalidFieldValue {
            tag,
            reason: "value contains the SOH delimiter".to_string(),
        });
    }
    Ok(())
}

/// Session-bound encoder that writes the standard header.
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    begin_string: String,
    sender_comp_id: CompId,
    target_comp_id: CompId,
}

impl MessageEncoder {
    /// Creates an encoder for one session.
    ///
    /// # Arguments
    /// * `begin_string` - The protocol version string
    /// * `sender_comp_id` - Our CompID (tag 49)
    /// * `target_comp_id` - The counterparty CompID (tag 56)
    #[must_use]
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: CompId,
        target_comp_id: CompId,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id,
            target_comp_id,
        }
    }

    /// Returns the BeginString written into every frame.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Encodes a message stamped with the current time.
    ///
    /// # Arguments
    /// * `msg_type` - Value of tag 35
    /// * `body` - Body fields, written in order after the header
    /// * `seq_num` - Value of tag 34
    ///
    /// # Errors
    /// Returns `EncodeError` if a body field cannot be represented on the wire.
    pub fn encode(
        &self,
        msg_type: &MsgType,
        body: &[Field],
        seq_num: SeqNum,
    ) -> Result<Bytes, EncodeError> {
        self.encode_at(msg_type, body, seq_num, Timestamp::now())
    }

    /// Encodes a message with an explicit SendingTime.
    ///
    /// # Errors
    /// Returns `EncodeError` if a body field cannot be represented on the wire.
    pub fn encode_at(
        &self,
        msg_type: &MsgType,
        body: &[Field],
        seq_num: SeqNum,
        sending_time: Timestamp,
    ) -> Result<Bytes, EncodeError> {
        let mut encoder = Encoder::new(&self.begin_string);
        encoder.try_put(tags::MSG_TYPE, msg_type.as_str())?;
        encoder.put_uint(tags::MSG_SEQ_NUM, seq_num.value());
        encoder.put_str(tags::SENDER_COMP_ID, self.sender_comp_id.as_str());
        encoder.put_str(tags::TARGET_COMP_ID, self.target_comp_id.as_str());
        encoder.put_str(tags::SENDING_TIME, &sending_time.format_millis());
        for field in body {
            encoder.try_put(field.tag, &field.value)?;
        }
        Ok(encoder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_encoder() -> MessageEncoder {
        MessageEncoder::new(
            "FIX.4.4",
            CompId::new("C1").unwrap(),
            CompId::new("STS").unwrap(),
        )
    }

    #[test]
    fn test_encoder_heartbeat_frame() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        let frame = encoder.finish();

        let prefix = b"8=FIX.4.4\x019=5\x0135=0\x01";
        assert!(frame.starts_with(prefix));
        let checksum = format_checksum(calculate_checksum(prefix));
        assert_eq!(&frame[prefix.len()..prefix.len() + 3], b"10=");
        assert_eq!(&frame[prefix.len() + 3..], &checksum);
    }

    #[test]
    fn test_encoder_has_no_trailing_delimiter() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        let frame = encoder.finish();
        assert_ne!(frame.last(), Some(&SOH));
    }

    #[test]
    fn test_try_put_rejects_soh_and_tag_zero() {
        let mut encoder = Encoder::new("FIX.4.4");
        assert_eq!(
            encoder.try_put(0, "x"),
            Err(EncodeError::InvalidTag { tag: 0 })
        );
        assert!(matches!(
            encoder.try_put(58, "a\x01b"),
            Err(EncodeError::InvalidFieldValue { tag: 58, .. })
        ));
        assert_eq!(encoder.body_len(), 0);
    }

    #[test]
    fn test_message_encoder_header_order() {
        let frame = session_encoder()
            .encode_at(
                &MsgType::Heartbeat,
                &[],
                SeqNum::new(7),
                Timestamp::from_millis(0),
            )
            .unwrap();
        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains(
            "35=0\x0134=7\x0149=C1\x0156=STS\x0152=19700101-00:00:00.000\x01"
        ));
    }

    #[test]
    fn test_message_encoder_body_length_is_measured() {
        let body = [Field::new(112, "XYZ"), Field::new(58, "hello")];
        let frame = session_encoder()
            .encode(&MsgType::Heartbeat, &body, SeqNum::new(3))
            .unwrap();

        let text = std::str::from_utf8(&frame).unwrap();
        let start = text.find("35=").unwrap();
        let end = text.rfind("10=").unwrap();
        let declared: usize = text
            .split('\x01')
            .find_map(|f| f.strip_prefix("9="))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, end - start);
    }

    #[test]
    fn test_message_encoder_keeps_duplicate_tags_in_order() {
        let body = [
            Field::new(131, "a"),
            Field::new(55, "N/A"),
            Field::new(131, "b"),
        ];
        let frame = session_encoder()
            .encode(&MsgType::Custom("U1".to_string()), &body, SeqNum::new(1))
            .unwrap();
        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains("131=a\x0155=N/A\x01131=b\x0110="));
    }

    #[test]
    fn test_message_encoder_rejects_bad_body() {
        let body = [Field::new(554, "tok\x01en")];
        let result = session_encoder().encode(&MsgType::Logon, &body, SeqNum::new(1));
        assert!(matches!(
            result,
            Err(EncodeError::InvalidFieldValue { tag: 554, .. })
        ));
    }
}
