/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Quote
//!
//! Request-for-quote workflow on top of a logged-in session.
//!
//! This crate provides:
//! - **Request parameters**: [`QuoteRequestParams`] and the QuoteRequest(R)
//!   body layout
//! - **Results**: [`QuoteResult`] extraction with fee fallback
//! - **Workflow**: [`QuoteWorkflow`], the registry of pending requests keyed
//!   by QuoteReqID

pub mod request;
pub mod result;
pub mod workflow;

pub use request::{DEFAULT_CFI_CODE, DEFAULT_CURRENCY, QuoteRequestParams, QuoteRequestParamsBuilder};
pub use result::{FeeSource, QuoteResult};
pub use workflow::{
    CorrelationIdGenerator, DEFAULT_QUOTE_TIMEOUT, PendingQuote, PendingQuoteRequest, QuoteConfig,
    QuoteOutcome, QuoteWorkflow, UuidGenerator,
};
