/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for frame reassembly.
//!
//! A frame starts at `8=<BeginString><SOH>` and ends right after the three
//! CheckSum digits of the first `<SOH>10=` that follows. When the declared
//! BodyLength points exactly at that trailer the frame is taken whole, even
//! if a field value contains the BeginString prefix. Otherwise BodyLength is
//! left to validation and bytes that cannot belong to a frame are dropped:
//!
//! - anything before the next BeginString prefix (a lone SOH after a CheckSum
//!   is dropped silently, anything else with a warning)
//! - a frame cut short by a new BeginString before its trailer
//! - a `10=` trailer whose value is not three digits

use bytes::{Buf, BufMut, Bytes, BytesMut};
use memchr::{memchr, memmem};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No trailer was found within the size limit; the buffer was discarded.
    #[error("frame too large: {size} bytes buffered without a trailer, maximum {max_size}")]
    FrameTooLarge {
        /// Bytes buffered when the limit was hit.
        size: usize,
        /// Configured maximum frame size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// SOH delimiter.
const SOH: u8 = 0x01;

/// Start of the CheckSum field, including the delimiter that precedes it.
const TRAILER: &[u8] = b"\x0110=";

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Codec that cuts a byte stream into complete frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// `8=<BeginString><SOH>`.
    prefix: Vec<u8>,
    /// Maximum frame size in bytes.
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec for the given BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The protocol version string, e.g. "FIX.4.4"
    #[must_use]
    pub fn new(begin_string: &str) -> Self {
        let mut prefix = Vec::with_capacity(begin_string.len() + 3);
        prefix.extend_from_slice(b"8=");
        prefix.extend_from_slice(begin_string.as_bytes());
        prefix.push(SOH);
        Self {
            prefix,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns the maximum frame size.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Drops bytes until `src` starts with the BeginString prefix.
    ///
    /// # Returns
    /// `true` if `src` now starts with the prefix.
    fn resync(&self, src: &mut BytesMut) -> bool {
        if src.starts_with(&self.prefix) {
            return true;
        }
        let skip = match memmem::find(src, &self.prefix) {
            Some(pos) => pos,
            // Keep a tail that may still grow into the prefix.
            None => src.len() - partial_prefix_len(src, &self.prefix),
        };
        if skip > 0 {
            if src[..skip].iter().any(|&b| b != SOH) {
                warn!(skipped = skip, "discarding bytes outside of a frame");
            }
            src.advance(skip);
        }
        src.starts_with(&self.prefix)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new("FIX.4.4")
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of `prefix`.
fn partial_prefix_len(buf: &[u8], prefix: &[u8]) -> usize {
    let max = buf.len().min(prefix.len().saturating_sub(1));
    (1..=max)
        .rev()
        .find(|&n| buf[buf.len() - n..] == prefix[..n])
        .unwrap_or(0)
}

/// Returns where the CheckSum tag starts according to the declared
/// BodyLength, if `frame` opens with a well-formed `9=<digits><SOH>`.
fn declared_trailer_start(frame: &[u8], prefix_len: usize) -> Option<usize> {
    let rest = frame.get(prefix_len..)?.strip_prefix(b"9=")?;
    let digits_len = memchr(SOH, rest)?;
    let digits = &rest[..digits_len];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let declared: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    (prefix_len + 2 + digits_len + 1).checked_add(declared)
}

/// Finds a BeginString prefix inside `frame` after its own prefix.
///
/// An occurrence directly after a digit is part of a field such as
/// `58=FIX.4.4`, not the start of a new frame.
fn embedded_prefix(frame: &[u8], prefix: &[u8]) -> Option<usize> {
    memmem::find_iter(frame, prefix)
        .filter(|&pos| pos >= prefix.len())
        .find(|&pos| !frame[pos - 1].is_ascii_digit())
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if !self.resync(src) {
                return Ok(None);
            }

            // The prefix's own SOH may be the one that starts the trailer.
            let search_from = self.prefix.len() - 1;
            let Some(rel) = memmem::find(&src[search_from..], TRAILER) else {
                if src.len() > self.max_frame_size {
                    let size = src.len();
                    src.clear();
                    return Err(CodecError::FrameTooLarge {
                        size,
                        max_size: self.max_frame_size,
                    });
                }
                src.reserve(256);
                return Ok(None);
            };
            let trailer_start = search_from + rel + 1;

            let length_agrees =
                declared_trailer_start(src, self.prefix.len()) == Some(trailer_start);
            if !length_agrees {
                if let Some(cut) = embedded_prefix(&src[..trailer_start], &self.prefix) {
                    warn!(dropped = cut, "discarding frame truncated by a new BeginString");
                    src.advance(cut);
                    continue;
                }
            }

            let digits_start = trailer_start + 3;
            let frame_end = digits_start + 3;
            let available = src.len().min(frame_end);
            let digits = &src[digits_start.min(available)..available];
            if !digits.iter().all(u8::is_ascii_digit) {
                warn!(
                    trailer = %String::from_utf8_lossy(digits),
                    "discarding frame with malformed checksum trailer"
                );
                src.advance(digits_start);
                continue;
            }
            if src.len() < frame_end {
                return Ok(None);
            }

            let frame = src.split_to(frame_end).freeze();
            trace!(len = frame.len(), "frame reassembled");
            return Ok(Some(frame));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.iter().any(|&b| b != SOH) {
            warn!(
                buffered = src.len(),
                "stream closed with an incomplete frame"
            );
        }
        src.clear();
        Ok(None)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
