//! Wire protocol error types.

use crate::header::MessageType;
use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Type byte does not name any known message
    #[error("unknown type ID: {0:#04x}")]
    UnknownType(u8),

    /// Known message type that this side never receives
    #[error("received unexpected message type: {0:?}")]
    UnexpectedType(MessageType),

    /// A nested read ran past the declared message length
    #[error("truncated body: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the record required
        needed: usize,
        /// Bytes left in the body
        available: usize,
    },

    /// Decoder finished with bytes left in the body
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    /// List body is not a whole number of elements
    #[error("body of {what} list is not a multiple of {element_size} (length of body is {body_len} bytes)")]
    Misaligned {
        /// Element being listed
        what: &'static str,
        /// Body length in bytes
        body_len: usize,
        /// Size of one element
        element_size: usize,
    },

    /// Header declares a length smaller than the header itself
    #[error("bad message length: {0}")]
    BadLength(usize),

    /// Encoded message would not fit the u16 length field
    #[error("message body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// Field value outside its permitted range
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}
