/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Push-driven stream reassembly.
//!
//! [`StreamReassembler`] owns the per-connection buffer. Every received
//! chunk is appended with [`StreamReassembler::push`], which returns a lazy
//! iterator over the frames that became complete. Incomplete tails stay
//! buffered for the next chunk. A reassembler belongs to one connection:
//! [`StreamReassembler::finish`] consumes it when the transport closes.

use crate::codec::{CodecError, FrameCodec};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

/// Per-connection frame reassembler.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    codec: FrameCodec,
}

impl StreamReassembler {
    /// Creates a reassembler around a configured codec.
    #[must_use]
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            codec,
        }
    }

    /// Appends a chunk and returns the frames it completed, in arrival order.
    ///
    /// The returned iterator extracts frames lazily; frames it does not
    /// yield stay buffered and are returned by the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { reassembler: self }
    }

    /// Returns the number of buffered bytes not yet part of a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Ends the connection's stream.
    ///
    /// # Returns
    /// The unconsumed tail, if it holds anything other than delimiters.
    #[must_use]
    pub fn finish(self) -> Option<Bytes> {
        let tail = self.buffer.freeze();
        if tail.iter().all(|&b| b == 0x01) {
            None
        } else {
            debug!(len = tail.len(), "reassembler finished with a partial frame");
            Some(tail)
        }
    }
}

/// Iterator over the frames completed by one [`StreamReassembler::push`].
#[derive(Debug)]
pub struct Frames<'a> {
    reassembler: &'a mut StreamReassembler,
}

impl Iterator for Frames<'_> {
    type Item = Result<Bytes, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        let StreamReassembler { buffer, codec } = &mut *self.reassembler;
        codec.decode(buffer).transpose()
    }
}
