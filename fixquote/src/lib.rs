/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote
//!
//! A FIX 4.4 style request-for-quote client for option quotes.
//!
//! FixQuote logs on to a counterparty with a bearer token, keeps the session
//! alive with Heartbeat and TestRequest, sends QuoteRequest(R) messages and
//! correlates the Quote(S) and QuoteRequestReject(AG) answers by QuoteReqID.
//!
//! ## Features
//!
//! - **Exact wire format**: BodyLength and CheckSum computed on encode,
//!   reported as discrepancies on decode
//! - **Chunk-agnostic framing**: frames are cut at `8=` and `10=ddd`, however
//!   the stream is split
//! - **Sans-IO session**: the state machine takes time as input and is fully
//!   testable without sockets
//! - **Async client**: one Tokio task owns the session; callers hold cheap
//!   handles
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixquote::prelude::*;
//!
//! let config = ClientBuilder::new()
//!     .with_endpoint("fix.example.net", 9443)
//!     .with_credentials(ClientCredentials::new("C1", "secret"))
//!     .with_session(SessionConfig::new(
//!         CompId::new("C1").unwrap(),
//!         CompId::new("STS").unwrap(),
//!     ))
//!     .build()?;
//! let mut client = QuoteClient::connect(config, &StaticTokenProvider::new(token)).await?;
//! let quote = client.quote(params).await?;
//! client.logout(None).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Fundamental types and error definitions
//! - [`tagvalue`]: tag=value encoding, decoding and validation
//! - [`session`]: Session state machine
//! - [`transport`]: Framing and the network boundary
//! - [`quote`]: Quote request workflow
//! - [`engine`]: Async client

pub mod core {
    //! Fundamental types and error definitions.
    pub use fixquote_core::*;
}

pub mod tagvalue {
    //! tag=value encoding, decoding and validation.
    pub use fixquote_tagvalue::*;
}

pub mod session {
    //! Session state machine.
    pub use fixquote_session::*;
}

pub mod transport {
    //! Framing and the network boundary.
    pub use fixquote_transport::*;
}

pub mod quote {
    //! Quote request workflow.
    pub use fixquote_quote::*;
}

pub mod engine {
    //! Async client.
    pub use fixquote_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixquote_core::{
        AuthError, CompId, DecodeError, EncodeError, Field, FixError, MsgType, Phase,
        ProtocolViolation, QuoteError, Result, SeqNum, SessionError, Side, Timestamp,
        TransportError, WireMessage,
    };

    // Tag-value encoding
    pub use fixquote_tagvalue::{MessageEncoder, decode, validate};

    // Session
    pub use fixquote_session::{
        DisconnectReason, SessionConfig, SessionConfigBuilder, SessionStateMachine,
        ViolationPolicy,
    };

    // Transport
    pub use fixquote_transport::{Connector, FrameCodec, StreamReassembler, TcpConnector};

    // Quote workflow
    pub use fixquote_quote::{
        FeeSource, PendingQuote, QuoteConfig, QuoteRequestParams, QuoteResult, QuoteWorkflow,
    };

    // Engine
    pub use fixquote_engine::{
        ClientBuilder, ClientConfig, ClientCredentials, ClientEvent, QuoteClient,
        StaticTokenProvider, TokenProvider,
    };
}
