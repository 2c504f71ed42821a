/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequence number management.
//!
//! The outbound counter is an owned value that only moves forward, one step
//! per transmitted frame. Inbound numbers are tracked for diagnostics: gaps
//! and duplicates are reported, never recovered.

use fixquote_core::types::SeqNum;

/// Outbound MsgSeqNum counter.
///
/// Starts at 1. [`OutboundSequence::peek`] gives the number the next frame
/// will carry; [`OutboundSequence::advance`] is called once that frame has
/// been encoded, so an encode failure never burns a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSequence {
    next: SeqNum,
}

impl OutboundSequence {
    /// Creates a counter starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: SeqNum::FIRST,
        }
    }

    /// Returns the number the next transmitted frame carries.
    #[inline]
    #[must_use]
    pub const fn peek(&self) -> SeqNum {
        self.next
    }

    /// Commits the current number and moves to the next one.
    ///
    /// # Returns
    /// The number that was committed.
    #[inline]
    pub fn advance(&mut self) -> SeqNum {
        let current = self.next;
        self.next = current.next();
        current
    }

    /// Returns how many frames have been transmitted.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.next.value() - 1
    }
}

impl Default for OutboundSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound MsgSeqNum tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundSequence {
    expected: Option<u64>,
    last: Option<SeqNum>,
}

impl InboundSequence {
    /// Creates a tracker that expects 1 as the first inbound number.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            expected: Some(1),
            last: None,
        }
    }

    /// Creates a tracker that accepts any first number as the baseline.
    #[must_use]
    pub const fn unanchored() -> Self {
        Self {
            expected: None,
            last: None,
        }
    }

    /// Records a received number.
    ///
    /// Tracking resynchronizes on the received number whatever the result,
    /// so one gap is reported once.
    pub fn observe(&mut self, received: u64) -> SequenceResult {
        let result = match self.expected {
            None => SequenceResult::Ok,
            Some(expected) if received == expected => SequenceResult::Ok,
            Some(expected) if received < expected => SequenceResult::TooLow { expected, received },
            Some(expected) => SequenceResult::Gap { expected, received },
        };
        self.expected = Some(received.saturating_add(1));
        self.last = Some(SeqNum::new(received));
        result
    }

    /// Returns the last received number.
    #[must_use]
    pub const fn last(&self) -> Option<SeqNum> {
        self.last
    }

    /// Returns the number expected next, if a baseline exists.
    #[must_use]
    pub const fn expected(&self) -> Option<u64> {
        self.expected
    }
}

/// Result of sequence number validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Sequence number is as expected.
    Ok,
    /// Sequence number is lower than expected (possible duplicate).
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Sequence number is higher than expected (gap detected).
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceResult {
    /// Returns true if the sequence is valid.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if there's a gap.
    #[must_use]
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    /// Returns true if the sequence is too low.
    #[must_use]
    pub const fn is_too_low(&self) -> bool {
        matches!(self, Self::TooLow { .. })
    }
}
