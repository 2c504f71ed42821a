/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Transport
//!
//! Turns an arbitrarily chunked byte stream into complete frames, and defines
//! the boundary to the network.
//!
//! This crate provides:
//! - **Codec**: [`FrameCodec`], a `tokio_util` codec that cuts frames at
//!   `8=<BeginString>` and `10=<ddd>`
//! - **Reassembler**: [`StreamReassembler`], the same framing driven by
//!   explicit `push` calls
//! - **Connector**: the [`Connector`] trait and its TCP implementation

pub mod codec;
pub mod reassembler;
pub mod tcp;

pub use codec::{CodecError, FrameCodec};
pub use reassembler::{Frames, StreamReassembler};
pub use tcp::{AsyncStream, BoxedStream, Connector, TcpConnector};
