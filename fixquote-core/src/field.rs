/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field tags and field value types.
//!
//! This module provides:
//! - [`tags`]: Numeric constants for every tag the client reads or writes
//! - [`Field`]: Owned `(tag, value)` pair used to describe message bodies
//! - [`FieldRef`]: Borrowed view of a decoded field with typed accessors

use crate::error::DecodeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag numbers used by the quote client.
pub mod tags {
    // Standard header and trailer.
    /// BeginString.
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength.
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum.
    pub const CHECK_SUM: u32 = 10;
    /// MsgSeqNum.
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType.
    pub const MSG_TYPE: u32 = 35;
    /// PossDupFlag.
    pub const POSS_DUP_FLAG: u32 = 43;
    /// SenderCompID.
    pub const SENDER_COMP_ID: u32 = 49;
    /// SenderSubID.
    pub const SENDER_SUB_ID: u32 = 50;
    /// SendingTime.
    pub const SENDING_TIME: u32 = 52;
    /// TargetCompID.
    pub const TARGET_COMP_ID: u32 = 56;
    /// TargetSubID.
    pub const TARGET_SUB_ID: u32 = 57;
    /// PossResend.
    pub const POSS_RESEND: u32 = 97;
    /// OrigSendingTime.
    pub const ORIG_SENDING_TIME: u32 = 122;

    // Session level.
    /// Text.
    pub const TEXT: u32 = 58;
    /// EncryptMethod.
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt.
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID.
    pub const TEST_REQ_ID: u32 = 112;
    /// ResetSeqNumFlag.
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    /// Username.
    pub const USERNAME: u32 = 553;
    /// Password.
    pub const PASSWORD: u32 = 554;
    /// RefSeqNum.
    pub const REF_SEQ_NUM: u32 = 45;
    /// RefTagID.
    pub const REF_TAG_ID: u32 = 371;
    /// RefMsgType.
    pub const REF_MSG_TYPE: u32 = 372;
    /// SessionRejectReason.
    pub const SESSION_REJECT_REASON: u32 = 373;

    // Quote request and response.
    /// Account.
    pub const ACCOUNT: u32 = 1;
    /// Currency.
    pub const CURRENCY: u32 = 15;
    /// LastPx.
    pub const LAST_PX: u32 = 31;
    /// Side.
    pub const SIDE: u32 = 54;
    /// Symbol.
    pub const SYMBOL: u32 = 55;
    /// TransactTime.
    pub const TRANSACT_TIME: u32 = 60;
    /// ValidUntilTime.
    pub const VALID_UNTIL_TIME: u32 = 62;
    /// QuoteID.
    pub const QUOTE_ID: u32 = 117;
    /// QuoteReqID.
    pub const QUOTE_REQ_ID: u32 = 131;
    /// BidPx.
    pub const BID_PX: u32 = 132;
    /// OfferPx.
    pub const OFFER_PX: u32 = 133;
    /// NoRelatedSym.
    pub const NO_RELATED_SYM: u32 = 146;
    /// UnderlyingSymbol.
    pub const UNDERLYING_SYMBOL: u32 = 311;
    /// CFICode.
    pub const CFI_CODE: u32 = 461;
    /// QuoteRequestRejectReason.
    pub const QUOTE_REQUEST_REJECT_REASON: u32 = 658;
    /// NoLegs.
    pub const NO_LEGS: u32 = 555;
    /// LegSymbol.
    pub const LEG_SYMBOL: u32 = 600;
    /// LegCFICode.
    pub const LEG_CFI_CODE: u32 = 608;
    /// LegMaturityDate.
    pub const LEG_MATURITY_DATE: u32 = 611;
    /// LegStrikePrice.
    pub const LEG_STRIKE_PRICE: u32 = 612;
    /// LegSide.
    pub const LEG_SIDE: u32 = 624;
    /// LegBidPx.
    pub const LEG_BID_PX: u32 = 681;
    /// LegOfferPx.
    pub const LEG_OFFER_PX: u32 = 684;
    /// LegQty.
    pub const LEG_QTY: u32 = 687;
    /// NoUnderlyings.
    pub const NO_UNDERLYINGS: u32 = 711;
    /// UnderlyingPx.
    pub const UNDERLYING_PX: u32 = 810;
    /// Option premium, venue specific.
    pub const PREMIUM: u32 = 9655;

    /// Tags that belong to the standard header after BodyLength.
    pub const HEADER: &[u32] = &[
        MSG_TYPE,
        MSG_SEQ_NUM,
        SENDER_COMP_ID,
        SENDER_SUB_ID,
        SENDING_TIME,
        TARGET_COMP_ID,
        TARGET_SUB_ID,
        POSS_DUP_FLAG,
        POSS_RESEND,
        ORIG_SENDING_TIME,
    ];

    /// Returns true if `tag` is part of the standard header.
    #[inline]
    #[must_use]
    pub fn is_header(tag: u32) -> bool {
        tag == BEGIN_STRING || tag == BODY_LENGTH || HEADER.contains(&tag)
    }
}

/// Owned `(tag, value)` pair.
///
/// Message bodies are described as ordered slices of `Field`; the encoder
/// writes them in the given order and never coalesces repeated tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// The field tag number.
    pub tag: u32,
    /// The field value, without delimiters.
    pub value: String,
}

impl Field {
    /// Creates a new field.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value
    #[inline]
    #[must_use]
    pub fn new(tag: u32, value: impl Into<String>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Creates a field from any displayable value.
    #[must_use]
    pub fn display(tag: u32, value: impl fmt::Display) -> Self {
        Self {
            tag,
            value: value.to_string(),
        }
    }

    /// Creates a `Y`/`N` boolean field.
    #[inline]
    #[must_use]
    pub fn flag(tag: u32, value: bool) -> Self {
        Self::new(tag, if value { "Y" } else { "N" })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, self.value)
    }
}

/// Borrowed reference to a field inside a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    /// The field tag number.
    pub tag: u32,
    /// The value bytes, without delimiters.
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a new field reference.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - Reference to the value bytes
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: "value is not valid utf-8".to_string(),
        })
    }

    /// Parses the value as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if parsing fails.
    pub fn parse<T: FromStr>(&self) -> Result<T, DecodeError> {
        let s = self.as_str()?;
        s.parse().map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: format!("failed to parse '{}' as {}", s, std::any::type_name::<T>()),
        })
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.parse()
    }

    /// Returns the value as a Decimal.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid decimal.
    pub fn as_decimal(&self) -> Result<Decimal, DecodeError> {
        self.parse()
    }

    /// Returns the value as a bool (`Y`/`N`).
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not `Y` or `N`.
    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self.value {
            b"Y" => Ok(true),
            b"N" => Ok(false),
            _ => Err(DecodeError::InvalidFieldValue {
                tag: self.tag,
                reason: "expected 'Y' or 'N'".to_string(),
            }),
        }
    }

    /// Converts the reference into an owned [`Field`], replacing invalid UTF-8.
    #[must_use]
    pub fn to_field(&self) -> Field {
        Field::new(self.tag, String::from_utf8_lossy(self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_display() {
        assert_eq!(Field::new(131, "q1").to_string(), "131=q1");
        assert_eq!(Field::display(108, 30).value, "30");
        assert_eq!(Field::flag(141, true).value, "Y");
        assert_eq!(Field::flag(141, false).value, "N");
    }

    #[test]
    fn test_field_ref_as_str() {
        let field = FieldRef::new(131, b"QR-1");
        assert_eq!(field.as_str().unwrap(), "QR-1");
    }

    #[test]
    fn test_field_ref_as_u64() {
        let field = FieldRef::new(34, b"12345");
        assert_eq!(field.as_u64().unwrap(), 12345);
    }

    #[test]
    fn test_field_ref_as_decimal() {
        let field = FieldRef::new(9655, b"0.05");
        assert_eq!(field.as_decimal().unwrap(), Decimal::new(5, 2));
        let bad = FieldRef::new(9655, b"N/A");
        assert!(matches!(
            bad.as_decimal(),
            Err(DecodeError::InvalidFieldValue { tag: 9655, .. })
        ));
    }

    #[test]
    fn test_field_ref_as_bool() {
        assert!(FieldRef::new(141, b"Y").as_bool().unwrap());
        assert!(!FieldRef::new(141, b"N").as_bool().unwrap());
        assert!(FieldRef::new(141, b"X").as_bool().is_err());
    }

    #[test]
    fn test_field_ref_invalid_utf8() {
        let field = FieldRef::new(58, &[0xFF, 0xFE]);
        assert!(field.as_str().is_err());
        assert_eq!(field.to_field().tag, 58);
    }

    #[test]
    fn test_header_tags() {
        assert!(tags::is_header(tags::MSG_TYPE));
        assert!(tags::is_header(tags::BEGIN_STRING));
        assert!(!tags::is_header(tags::QUOTE_REQ_ID));
        assert!(!tags::is_header(tags::CHECK_SUM));
    }
}
