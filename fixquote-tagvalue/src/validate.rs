/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Frame validation.
//!
//! Recomputes BodyLength and CheckSum for a decoded frame and reports every
//! mismatch. Whether a mismatch is fatal is the session's decision.

use crate::checksum::calculate_checksum;
use fixquote_core::message::{Discrepancy, WireMessage};

/// Recomputes BodyLength and CheckSum and lists any mismatch.
///
/// # Returns
/// An empty vector when the frame is consistent.
#[must_use]
pub fn validate(msg: &WireMessage) -> Vec<Discrepancy> {
    let mut discrepancies = Vec::new();

    let actual = msg.body_range().len();
    if actual != msg.declared_body_length() {
        discrepancies.push(Discrepancy::BodyLength {
            declared: msg.declared_body_length(),
            actual,
        });
    }

    let calculated = calculate_checksum(&msg.as_bytes()[..msg.checksum_offset()]);
    if calculated != msg.declared_checksum() {
        discrepancies.push(Discrepancy::CheckSum {
            declared: msg.declared_checksum(),
            calculated,
        });
    }

    discrepancies
}
