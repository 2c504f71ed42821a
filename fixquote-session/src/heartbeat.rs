/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! This module handles session liveness timing:
//! - Sending heartbeats when nothing was sent for one interval
//! - Sending a TestRequest when nothing was received for one interval plus a
//!   grace period
//! - Detecting a TestRequest left unanswered for a further interval
//!
//! All checks take the current [`Instant`] from the caller.

use fixquote_core::types::{SeqNum, Timestamp};
use std::time::{Duration, Instant};

/// How a received Heartbeat relates to the outstanding TestRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEcho {
    /// The Heartbeat carried no TestReqID.
    Plain,
    /// The Heartbeat echoed the outstanding TestReqID, which is now cleared.
    Matched,
    /// The Heartbeat carried a TestReqID we are not waiting for.
    Unexpected,
}

/// Manages heartbeat timing for a session.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// Heartbeat interval.
    interval: Duration,
    /// Extra silence tolerated before probing.
    grace: Duration,
    /// Time of last message sent.
    last_sent: Instant,
    /// Time of last message received.
    last_received: Instant,
    /// Pending TestRequest ID and when it was sent.
    test_request: Option<(String, Instant)>,
}

impl HeartbeatManager {
    /// Creates a new heartbeat manager.
    ///
    /// # Arguments
    /// * `interval` - The heartbeat interval
    /// * `grace` - Silence tolerated past the interval before a TestRequest
    /// * `now` - The current time
    #[must_use]
    pub const fn new(interval: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            interval,
            grace,
            last_sent: now,
            last_received: now,
            test_request: None,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Records that a message was received.
    #[inline]
    pub fn on_message_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Matches a received Heartbeat against the outstanding TestRequest.
    ///
    /// # Arguments
    /// * `test_req_id` - The TestReqID (tag 112) the Heartbeat carried
    pub fn on_heartbeat(&mut self, test_req_id: Option<&str>) -> HeartbeatEcho {
        let Some(received) = test_req_id else {
            return HeartbeatEcho::Plain;
        };
        match &self.test_request {
            Some((pending, _)) if pending == received => {
                self.test_request = None;
                HeartbeatEcho::Matched
            }
            _ => HeartbeatEcho::Unexpected,
        }
    }

    /// Checks if a heartbeat should be sent.
    ///
    /// A heartbeat is due if no message has been sent within the interval.
    #[must_use]
    pub fn should_send_heartbeat(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_sent) >= self.interval
    }

    /// Checks if a TestRequest should be sent.
    ///
    /// A TestRequest is due if nothing has been received within the interval
    /// plus the grace period, and no TestRequest is already pending.
    #[must_use]
    pub fn should_send_test_request(&self, now: Instant) -> bool {
        self.test_request.is_none()
            && now.saturating_duration_since(self.last_received)
                >= self.interval.saturating_add(self.grace)
    }

    /// Checks whether the pending TestRequest went unanswered.
    ///
    /// # Returns
    /// The TestReqID and the time elapsed since it was sent, once a full
    /// interval has passed without a matching Heartbeat.
    #[must_use]
    pub fn unanswered_test_request(&self, now: Instant) -> Option<(&str, Duration)> {
        let (id, sent_at) = self.test_request.as_ref()?;
        let elapsed = now.saturating_duration_since(*sent_at);
        (elapsed >= self.interval).then_some((id.as_str(), elapsed))
    }

    /// Records that a TestRequest was sent.
    ///
    /// # Arguments
    /// * `test_req_id` - The TestReqID that was sent
    /// * `now` - The current time
    pub fn on_test_request_sent(&mut self, test_req_id: String, now: Instant) {
        self.test_request = Some((test_req_id, now));
        self.last_sent = now;
    }

    /// Forgets the pending TestRequest.
    pub fn clear_test_request(&mut self) {
        self.test_request = None;
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.test_request.as_ref().map(|(id, _)| id.as_str())
    }

    /// Returns the time of the last sent message.
    #[must_use]
    pub const fn last_sent(&self) -> Instant {
        self.last_sent
    }

    /// Returns the time of the last received message.
    #[must_use]
    pub const fn last_received(&self) -> Instant {
        self.last_received
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the heartbeat interval.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Restarts both timers at `now` and drops any pending TestRequest.
    pub fn reset(&mut self, now: Instant) {
        self.last_sent = now;
        self.last_received = now;
        self.test_request = None;
    }
}

/// Generates a TestReqID.
///
/// Combines the wall clock with the outbound sequence number of the
/// TestRequest, so ids never repeat within a session.
#[must_use]
pub fn generate_test_req_id(seq_num: SeqNum) -> String {
    format!("TEST{}-{}", Timestamp::now().as_millis(), seq_num)
}
