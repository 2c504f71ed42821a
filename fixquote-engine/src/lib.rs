/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Engine
//!
//! Async client for the FixQuote session and quote workflow.
//!
//! This crate provides:
//! - **Client**: [`QuoteClient`], connect, request quotes, log out
//! - **Driver**: the task that owns the session and serializes all state
//!   changes
//! - **Credentials**: the [`TokenProvider`] boundary
//! - **Builder API**: Fluent configuration with [`ClientBuilder`]

pub mod builder;
pub mod client;
pub mod credentials;
mod driver;

pub use builder::{ClientBuilder, ClientConfig};
pub use client::{ClientEvent, QuoteClient};
pub use credentials::{ClientCredentials, StaticTokenProvider, TokenProvider};
