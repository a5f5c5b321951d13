//! Record-level encode/decode helpers shared by the message bodies.
//!
//! Bodies are decoded from a `Bytes` holding exactly the declared body;
//! every read is bounds-checked first so that an overrun surfaces as
//! [`WireError::Truncated`] instead of a panic inside `bytes`.

use bytes::{Buf, Bytes, BytesMut};

use crate::WireError;

/// Fail unless `buf` holds at least `needed` more bytes
#[inline]
pub fn ensure(buf: &Bytes, needed: usize) -> Result<(), WireError> {
    if buf.remaining() < needed {
        return Err(WireError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// A fixed-size binary record
pub trait Record: Sized {
    /// Encoded size in bytes
    const SIZE: usize;
    /// Name used in list-length diagnostics
    const NAME: &'static str;

    /// Append the record to `buf`
    fn encode(&self, buf: &mut BytesMut);

    /// Read the record from the front of `buf`; callers have already
    /// checked that `SIZE` bytes are available
    fn decode_unchecked(buf: &mut Bytes) -> Self;

    /// Bounds-checked decode
    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        ensure(buf, Self::SIZE)?;
        Ok(Self::decode_unchecked(buf))
    }
}

/// Decode a body made only of repeated fixed-size records
pub fn decode_list<T: Record>(body: &mut Bytes) -> Result<Vec<T>, WireError> {
    let body_len = body.remaining();
    if body_len % T::SIZE != 0 {
        return Err(WireError::Misaligned {
            what: T::NAME,
            body_len,
            element_size: T::SIZE,
        });
    }

    let mut items = Vec::with_capacity(body_len / T::SIZE);
    while body.has_remaining() {
        items.push(T::decode_unchecked(body));
    }
    Ok(items)
}

/// Encode every record in order
pub fn encode_list<T: Record>(items: &[T], buf: &mut BytesMut) {
    for item in items {
        item.encode(buf);
    }
}

#[inline]
pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, WireError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

#[inline]
pub(crate) fn get_u16(buf: &mut Bytes) -> Result<u16, WireError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

#[inline]
pub(crate) fn get_u32(buf: &mut Bytes) -> Result<u32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

#[inline]
pub(crate) fn get_u64(buf: &mut Bytes) -> Result<u64, WireError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

#[inline]
pub(crate) fn get_f32(buf: &mut Bytes) -> Result<f32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

/// Take `n` raw bytes
#[inline]
pub(crate) fn get_bytes(buf: &mut Bytes, n: usize) -> Result<Bytes, WireError> {
    ensure(buf, n)?;
    Ok(buf.split_to(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[derive(Debug, PartialEq)]
    struct Pair(u16, u8);

    impl Record for Pair {
        const SIZE: usize = 3;
        const NAME: &'static str = "pair";

        fn encode(&self, buf: &mut BytesMut) {
            buf.put_u16(self.0);
            buf.put_u8(self.1);
        }

        fn decode_unchecked(buf: &mut Bytes) -> Self {
            Pair(buf.get_u16(), buf.get_u8())
        }
    }

    #[test]
    fn test_list_roundtrip() {
        let items = vec![Pair(1, 2), Pair(0xFFFF, 9)];
        let mut buf = BytesMut::new();
        encode_list(&items, &mut buf);
        assert_eq!(buf.len(), 6);

        let mut body = buf.freeze();
        assert_eq!(decode_list::<Pair>(&mut body).unwrap(), items);
        assert!(body.is_empty());
    }

    #[test]
    fn test_list_misaligned() {
        let mut body = Bytes::from_static(&[0, 1, 2, 3]);
        let err = decode_list::<Pair>(&mut body).unwrap_err();
        assert_eq!(
            err,
            WireError::Misaligned {
                what: "pair",
                body_len: 4,
                element_size: 3
            }
        );
    }

    #[test]
    fn test_truncated_read() {
        let mut body = Bytes::from_static(&[0, 1, 2]);
        assert_eq!(
            get_u32(&mut body).unwrap_err(),
            WireError::Truncated {
                needed: 4,
                available: 3
            }
        );
    }
}
