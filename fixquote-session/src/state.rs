/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session state.
//!
//! [`SessionState`] is the single owned value the dispatch path mutates: the
//! phase, both sequence trackers and the liveness timers. Phase changes go
//! through [`SessionState::transition`], which enforces the lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingLogonAck -> LoggedIn -> LoggingOut -> Disconnected
//! ```
//!
//! with `Disconnected` reachable from every other phase.

use crate::heartbeat::HeartbeatManager;
use crate::sequence::{InboundSequence, OutboundSequence};
use fixquote_core::types::{Phase, SeqNum};
use std::time::{Duration, Instant};

/// Returns true if the lifecycle allows moving from `from` to `to`.
#[must_use]
pub const fn is_valid_transition(from: Phase, to: Phase) -> bool {
    matches!(
        (from, to),
        (Phase::Disconnected, Phase::Connecting)
            | (Phase::Connecting, Phase::AwaitingLogonAck)
            | (Phase::AwaitingLogonAck, Phase::LoggedIn)
            | (Phase::LoggedIn, Phase::LoggingOut)
            | (
                Phase::Connecting | Phase::AwaitingLogonAck | Phase::LoggedIn | Phase::LoggingOut,
                Phase::Disconnected
            )
    )
}

/// State of one session.
#[derive(Debug)]
pub struct SessionState {
    phase: Phase,
    outbound: OutboundSequence,
    inbound: InboundSequence,
    heartbeat: HeartbeatManager,
}

impl SessionState {
    /// Creates a disconnected state.
    ///
    /// # Arguments
    /// * `heartbeat` - Liveness timers for the session
    /// * `inbound` - Inbound tracker, anchored at 1 when the session resets
    ///   sequence numbers on logon
    #[must_use]
    pub fn new(heartbeat: HeartbeatManager, inbound: InboundSequence) -> Self {
        Self {
            phase: Phase::Disconnected,
            outbound: OutboundSequence::new(),
            inbound,
            heartbeat,
        }
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `to` if the lifecycle allows it.
    ///
    /// # Returns
    /// The previous phase, or `None` if the transition is not allowed.
    pub fn transition(&mut self, to: Phase) -> Option<Phase> {
        let from = self.phase;
        if !is_valid_transition(from, to) {
            return None;
        }
        self.phase = to;
        Some(from)
    }

    /// Returns the number the next outbound frame carries.
    #[must_use]
    pub const fn next_outbound_seq(&self) -> SeqNum {
        self.outbound.peek()
    }

    /// Returns the last inbound MsgSeqNum seen.
    #[must_use]
    pub const fn last_inbound_seq(&self) -> Option<SeqNum> {
        self.inbound.last()
    }

    /// Returns the heartbeat interval in effect.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat.interval()
    }

    /// Returns when the last frame was sent.
    #[must_use]
    pub const fn last_sent_at(&self) -> Instant {
        self.heartbeat.last_sent()
    }

    /// Returns when the last frame was received.
    #[must_use]
    pub const fn last_received_at(&self) -> Instant {
        self.heartbeat.last_received()
    }

    /// Returns the outbound counter.
    #[must_use]
    pub const fn outbound(&self) -> &OutboundSequence {
        &self.outbound
    }

    pub(crate) fn outbound_mut(&mut self) -> &mut OutboundSequence {
        &mut self.outbound
    }

    pub(crate) fn inbound_mut(&mut self) -> &mut InboundSequence {
        &mut self.inbound
    }

    /// Returns the liveness timers.
    #[must_use]
    pub const fn heartbeat(&self) -> &HeartbeatManager {
        &self.heartbeat
    }

    pub(crate) fn heartbeat_mut(&mut self) -> &mut HeartbeatManager {
        &mut self.heartbeat
    }
}
