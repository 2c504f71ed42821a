/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Quote request parameters.
//!
//! [`QuoteRequestParams`] describes one single-leg option the client wants
//! priced. It knows how to check itself and how to lay itself out as the
//! body of a QuoteRequest(R).

use chrono::NaiveDate;
use fixquote_core::error::QuoteError;
use fixquote_core::field::{Field, tags};
use fixquote_core::types::{Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default CFI code: option, call, European, cash settled.
pub const DEFAULT_CFI_CODE: &str = "OCECCN";

/// Default quote currency.
pub const DEFAULT_CURRENCY: &str = "USDC";

/// Placeholder for Symbol (55) and LegSymbol (600); the instrument is
/// described by the underlying and leg fields instead.
const NOT_APPLICABLE: &str = "N/A";

/// Format of LegMaturityDate (611).
const MATURITY_FORMAT: &str = "%Y%m%d";

/// Parameters of a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequestParams {
    /// UnderlyingSymbol (311), e.g. "BTC-USDC".
    pub underlying_symbol: String,
    /// LegStrikePrice (612).
    pub strike: Decimal,
    /// LegMaturityDate (611).
    pub maturity: NaiveDate,
    /// Side (54) and LegSide (624).
    pub side: Side,
    /// LegQty (687).
    pub quantity: Decimal,
    /// Currency (15).
    pub currency: String,
    /// LegCFICode (608).
    pub cfi_code: String,
    /// Account (1); falls back to the workflow's configured account.
    pub account: Option<String>,
}

impl QuoteRequestParams {
    /// Starts a builder with the three settings every request needs.
    ///
    /// # Arguments
    /// * `underlying_symbol` - The underlying, e.g. "BTC-USDC"
    /// * `strike` - The option strike
    /// * `maturity` - The option expiry date
    #[must_use]
    pub fn builder(
        underlying_symbol: impl Into<String>,
        strike: Decimal,
        maturity: NaiveDate,
    ) -> QuoteRequestParamsBuilder {
        QuoteRequestParamsBuilder {
            params: Self {
                underlying_symbol: underlying_symbol.into(),
                strike,
                maturity,
                side: Side::Sell,
                quantity: Decimal::ONE,
                currency: DEFAULT_CURRENCY.to_string(),
                cfi_code: DEFAULT_CFI_CODE.to_string(),
                account: None,
            },
        }
    }

    /// Checks the parameters before anything is sent.
    ///
    /// A CFI code whose category is neither call nor put is only logged.
    ///
    /// # Errors
    /// Returns `QuoteError::InvalidRequest` for an empty underlying, a
    /// non-positive strike or quantity, an empty currency or account, or a
    /// CFI code that is not six characters.
    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.underlying_symbol.trim().is_empty() {
            return Err(invalid("underlying symbol is empty"));
        }
        if self.strike <= Decimal::ZERO {
            return Err(invalid(format!("strike must be positive, got {}", self.strike)));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(invalid(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(invalid("currency is empty"));
        }
        if self.account.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(invalid("account is empty"));
        }
        if self.cfi_code.chars().count() != 6 || !self.cfi_code.is_ascii() {
            return Err(invalid(format!(
                "CFI code must be 6 ASCII characters, got {:?}",
                self.cfi_code
            )));
        }
        if !matches!(self.cfi_code.as_bytes()[1], b'C' | b'P') {
            warn!(cfi_code = %self.cfi_code, "CFI code is neither a call nor a put");
        }
        Ok(())
    }

    /// Lays the request out as a QuoteRequest(R) body.
    ///
    /// # Arguments
    /// * `quote_req_id` - The correlation id (tag 131)
    /// * `account` - The account to bill (tag 1)
    /// * `transact_time` - TransactTime (tag 60)
    #[must_use]
    pub fn to_fields(
        &self,
        quote_req_id: &str,
        account: &str,
        transact_time: Timestamp,
    ) -> Vec<Field> {
        let side = self.side.as_char().to_string();
        vec![
            Field::new(tags::QUOTE_REQ_ID, quote_req_id),
            Field::new(tags::NO_RELATED_SYM, "1"),
            Field::new(tags::SYMBOL, NOT_APPLICABLE),
            Field::new(tags::NO_UNDERLYINGS, "1"),
            Field::new(tags::UNDERLYING_SYMBOL, self.underlying_symbol.as_str()),
            Field::new(tags::SIDE, side.as_str()),
            Field::new(tags::CURRENCY, self.currency.as_str()),
            Field::new(tags::ACCOUNT, account),
            Field::new(tags::NO_LEGS, "1"),
            Field::new(tags::LEG_SYMBOL, NOT_APPLICABLE),
            Field::new(tags::LEG_CFI_CODE, self.cfi_code.as_str()),
            Field::display(tags::LEG_MATURITY_DATE, self.maturity.format(MATURITY_FORMAT)),
            Field::display(tags::LEG_STRIKE_PRICE, self.strike.normalize()),
            Field::new(tags::LEG_SIDE, side),
            Field::display(tags::LEG_QTY, self.quantity.normalize()),
            Field::new(tags::TRANSACT_TIME, transact_time.format_millis().as_str()),
        ]
    }
}

/// Builder for [`QuoteRequestParams`].
#[derive(Debug, Clone)]
pub struct QuoteRequestParamsBuilder {
    params: QuoteRequestParams,
}

impl QuoteRequestParamsBuilder {
    /// Sets the side.
    #[must_use]
    pub const fn side(mut self, side: Side) -> Self {
        self.params.side = side;
        self
    }

    /// Sets the leg quantity.
    #[must_use]
    pub const fn quantity(mut self, quantity: Decimal) -> Self {
        self.params.quantity = quantity;
        self
    }

    /// Sets the currency.
    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.params.currency = currency.into();
        self
    }

    /// Sets the CFI code.
    #[must_use]
    pub fn cfi_code(mut self, cfi_code: impl Into<String>) -> Self {
        self.params.cfi_code = cfi_code.into();
        self
    }

    /// Sets the account.
    #[must_use]
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.params.account = Some(account.into());
        self
    }

    /// Builds and validates the parameters.
    ///
    /// # Errors
    /// Returns `QuoteError::InvalidRequest` if validation fails.
    pub fn build(self) -> Result<QuoteRequestParams, QuoteError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

fn invalid(reason: impl Into<String>) -> QuoteError {
    QuoteError::InvalidRequest(reason.into())
}
