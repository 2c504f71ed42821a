/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixQuote Session
//!
//! Session layer of the FixQuote client.
//!
//! This crate provides:
//! - **State machine**: [`SessionStateMachine`], a sans-IO machine that runs
//!   logon, liveness, rejects and logout for one connection
//! - **Sequence management**: owned outbound counter and log-only inbound
//!   tracking
//! - **Heartbeat handling**: Heartbeat/TestRequest timing
//! - **Configuration**: [`SessionConfig`] and its builder

pub mod config;
pub mod event;
pub mod heartbeat;
pub mod machine;
pub mod sequence;
pub mod state;

pub use config::{ConfigError, SessionConfig, SessionConfigBuilder, ViolationPolicy};
pub use event::{DisconnectReason, RejectNotice, SessionEvent};
pub use heartbeat::{HeartbeatEcho, HeartbeatManager};
pub use machine::SessionStateMachine;
pub use sequence::{InboundSequence, OutboundSequence, SequenceResult};
pub use state::SessionState;
