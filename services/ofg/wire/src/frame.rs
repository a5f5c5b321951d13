//! Stream framing.
//!
//! Messages arrive back to back on a byte stream. The decoder peeks the
//! u16 length, waits until that many bytes are buffered, then hands the
//! body to the type registry.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::header::{Header, HEADER_SIZE};
use crate::message::Message;
use crate::registry;
use crate::WireError;

/// Which message types the decoder accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client side: send-only types are rejected as unexpected
    ClientBound,
    /// Accept every type (backend side, tests, capture tools)
    Any,
}

/// Incremental decoder for a stream of messages
#[derive(Debug)]
pub struct MessageDecoder {
    direction: Direction,
}

impl MessageDecoder {
    /// Decoder for the client side of a connection
    pub fn new() -> Self {
        Self {
            direction: Direction::ClientBound,
        }
    }

    /// Decoder with an explicit direction policy
    pub fn with_direction(direction: Direction) -> Self {
        Self { direction }
    }

    /// Decode one message from `buf`
    ///
    /// Returns `Ok(None)` when more bytes are needed. On error the stream
    /// cannot be resynchronized and the caller should drop the connection.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        // Peek at message length
        let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if length < HEADER_SIZE {
            return Err(WireError::BadLength(length));
        }

        if buf.len() < length {
            return Ok(None);
        }

        let mut frame = buf.split_to(length).freeze();
        let header = Header::decode(&mut frame)?;
        trace!(
            "Decoding {:?} (xid {}, {} body bytes)",
            header.typ,
            header.xid,
            frame.remaining()
        );

        let msg = match self.direction {
            Direction::ClientBound => registry::decode(&header, frame)?,
            Direction::Any => registry::decode_any(&header, frame)?,
        };
        Ok(Some(msg))
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}
