/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Structured quote results.
//!
//! Counterparties do not agree on where the premium of a quote lives. The
//! fee is taken from the first usable field in [`FeeSource::FALLBACK_ORDER`]
//! and the result records which field that was.

use chrono::NaiveDate;
use fixquote_core::error::DecodeError;
use fixquote_core::field::tags;
use fixquote_core::message::WireMessage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Field a quote's fee was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeSource {
    /// Premium (9655).
    Premium,
    /// BidPx (132).
    BidPx,
    /// OfferPx (133).
    OfferPx,
    /// LegBidPx (681).
    LegBidPx,
    /// LegOfferPx (684).
    LegOfferPx,
    /// LastPx (31).
    LastPx,
}

impl FeeSource {
    /// Candidate fields, most specific first.
    pub const FALLBACK_ORDER: [Self; 6] = [
        Self::Premium,
        Self::BidPx,
        Self::OfferPx,
        Self::LegBidPx,
        Self::LegOfferPx,
        Self::LastPx,
    ];

    /// Returns the tag this source reads.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::Premium => tags::PREMIUM,
            Self::BidPx => tags::BID_PX,
            Self::OfferPx => tags::OFFER_PX,
            Self::LegBidPx => tags::LEG_BID_PX,
            Self::LegOfferPx => tags::LEG_OFFER_PX,
            Self::LastPx => tags::LAST_PX,
        }
    }

    /// Returns the field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Premium => "Premium",
            Self::BidPx => "BidPx",
            Self::OfferPx => "OfferPx",
            Self::LegBidPx => "LegBidPx",
            Self::LegOfferPx => "LegOfferPx",
            Self::LastPx => "LastPx",
        }
    }
}

impl fmt::Display for FeeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.tag())
    }
}

/// A priced quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteResult {
    /// QuoteReqID (131) echoed by the counterparty.
    pub correlation_id: String,
    /// QuoteID (117).
    pub quote_id: Option<String>,
    /// MsgSeqNum of the Quote frame.
    pub msg_seq_num: Option<u64>,
    /// Symbol (55).
    pub symbol: Option<String>,
    /// UnderlyingSymbol (311).
    pub underlying_symbol: Option<String>,
    /// LegStrikePrice (612).
    pub strike: Option<Decimal>,
    /// LegMaturityDate (611).
    pub maturity: Option<NaiveDate>,
    /// CFICode (461), else LegCFICode (608).
    pub cfi_code: Option<String>,
    /// BidPx (132).
    pub bid_px: Option<Decimal>,
    /// OfferPx (133).
    pub offer_px: Option<Decimal>,
    /// LastPx (31).
    pub last_px: Option<Decimal>,
    /// The fee, from the first usable source.
    pub fee: Option<Decimal>,
    /// Where `fee` came from.
    pub fee_source: Option<FeeSource>,
    /// TransactTime (60), as sent.
    pub transact_time: Option<String>,
    /// ValidUntilTime (62), as sent.
    pub valid_until: Option<String>,
}

impl QuoteResult {
    /// Extracts a result from a Quote(S) frame.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` if QuoteReqID (131) is
    /// absent.
    pub fn from_message(msg: &WireMessage) -> Result<Self, DecodeError> {
        let correlation_id = msg
            .get(tags::QUOTE_REQ_ID)
            .ok_or(DecodeError::MissingRequiredField {
                tag: tags::QUOTE_REQ_ID,
            })?
            .to_string();
        let text = |tag: u32| msg.get(tag).map(str::to_string);
        let (fee, fee_source) = match extract_fee(msg) {
            Some((fee, source)) => (Some(fee), Some(source)),
            None => (None, None),
        };

        Ok(Self {
            quote_id: text(tags::QUOTE_ID),
            msg_seq_num: msg.seq_num().map(|s| s.value()),
            symbol: text(tags::SYMBOL),
            underlying_symbol: text(tags::UNDERLYING_SYMBOL),
            strike: decimal(msg, tags::LEG_STRIKE_PRICE),
            maturity: msg
                .get(tags::LEG_MATURITY_DATE)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok()),
            cfi_code: text(tags::CFI_CODE).or_else(|| text(tags::LEG_CFI_CODE)),
            bid_px: decimal(msg, tags::BID_PX),
            offer_px: decimal(msg, tags::OFFER_PX),
            last_px: decimal(msg, tags::LAST_PX),
            fee,
            fee_source,
            transact_time: text(tags::TRANSACT_TIME),
            valid_until: text(tags::VALID_UNTIL_TIME),
            correlation_id,
        })
    }
}

fn decimal(msg: &WireMessage, tag: u32) -> Option<Decimal> {
    let field = msg.field(tag)?;
    match field.as_decimal() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(tag, error = %err, "ignoring unparseable price field");
            None
        }
    }
}

/// Finds the fee in fallback order, skipping unparseable candidates.
fn extract_fee(msg: &WireMessage) -> Option<(Decimal, FeeSource)> {
    for source in FeeSource::FALLBACK_ORDER {
        let Some(field) = msg.field(source.tag()) else {
            continue;
        };
        match field.as_decimal() {
            Ok(fee) => {
                debug!(%source, %fee, "fee extracted");
                return Some((fee, source));
            }
            Err(err) => warn!(%source, error = %err, "skipping unparseable fee candidate"),
        }
    }
    None
}
