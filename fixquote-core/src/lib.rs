/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Core
//!
//! Core types, wire message model and error definitions shared by every
//! FixQuote crate.
//!
//! This crate provides:
//! - **Error types**: One `thiserror` enum per layer, unified under [`FixError`]
//! - **Field types**: Tag constants, the owned [`Field`] used when encoding and
//!   the borrowed [`FieldRef`] returned by accessors
//! - **Message types**: [`MsgType`] and the decoded [`WireMessage`] with its
//!   per-frame tag index
//! - **Core types**: [`SeqNum`], [`Timestamp`], [`CompId`], [`Side`], [`Phase`]

pub mod error;
pub mod field;
pub mod message;
pub mod types;

pub use error::{
    AuthError, DecodeError, EncodeError, FixError, ProtocolViolation, QuoteError, Result,
    SessionError, TransportError,
};
pub use field::{Field, FieldRef, tags};
pub use message::{Discrepancy, MsgType, WireMessage, render_frame};
pub use types::{CompId, Phase, SeqNum, Side, Timestamp};
