//! String field conventions.
//!
//! Strings are not self-describing on the wire. Each field is either a
//! fixed-width, NUL-padded slot or a NUL-terminated run; the message
//! format decides which.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::ensure;
use crate::WireError;

/// Read a fixed-width field of `width` bytes, stopping at the first NUL
pub fn read_fixed(buf: &mut Bytes, width: usize) -> Result<String, WireError> {
    ensure(buf, width)?;
    let raw = buf.split_to(width);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

/// Write `s` into a fixed-width field, truncating or NUL padding to `width`
pub fn write_fixed(buf: &mut BytesMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

/// Read a NUL-terminated string; the terminator is consumed
pub fn read_null_terminated(buf: &mut Bytes) -> Result<String, WireError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(WireError::Truncated {
            needed: buf.len() + 1,
            available: buf.len(),
        })?;
    let raw = buf.split_to(end);
    buf.advance(1);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Write `s` followed by a NUL terminator
pub fn write_null_terminated(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_padding_and_truncation() {
        let mut buf = BytesMut::new();
        write_fixed(&mut buf, "abc", 6);
        write_fixed(&mut buf, "too long", 4);
        assert_eq!(&buf[..], b"abc\0\0\0too ");

        let mut bytes = buf.freeze();
        assert_eq!(read_fixed(&mut bytes, 6).unwrap(), "abc");
        assert_eq!(read_fixed(&mut bytes, 4).unwrap(), "too ");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_null_terminated() {
        let mut buf = BytesMut::new();
        write_null_terminated(&mut buf, "switch-a");
        buf.put_u8(7);

        let mut bytes = buf.freeze();
        assert_eq!(read_null_terminated(&mut bytes).unwrap(), "switch-a");
        assert_eq!(&bytes[..], &[7]);
    }

    #[test]
    fn test_null_terminated_missing_terminator() {
        let mut bytes = Bytes::from_static(b"abc");
        assert!(read_null_terminated(&mut bytes).is_err());
    }
}
