/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Tag-Value
//!
//! The message codec: pure functions that turn typed messages into
//! SOH-delimited `tag=value` frames and back.
//!
//! ## Features
//!
//! - **Measured BodyLength**: the encoder counts the serialized bytes, it never
//!   estimates them
//! - **Lenient decoding**: BodyLength and CheckSum mismatches do not fail
//!   [`decode`]; [`validate`] reports them separately so the caller picks the
//!   policy
//! - **`memchr` scanning**: delimiter search uses `memchr`

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod validate;

#[cfg(test)]
mod proptests;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::{decode, decode_bytes};
pub use encoder::{Encoder, MessageEncoder, SOH};
pub use fixquote_core::message::{Discrepancy, WireMessage};
pub use validate::validate;
