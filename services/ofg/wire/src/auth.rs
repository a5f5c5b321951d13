//! Plaintext authentication exchange.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{get_bytes, get_u32, get_u8};
use crate::WireError;

/// Authentication scheme offered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    /// Username and password
    PlainText,
    /// Any other scheme; the client cannot answer it
    Other(u8),
}

impl AuthType {
    /// Wire code
    pub fn code(self) -> u8 {
        match self {
            AuthType::PlainText => 0,
            AuthType::Other(code) => code,
        }
    }
}

impl From<u8> for AuthType {
    fn from(code: u8) -> Self {
        match code {
            0 => AuthType::PlainText,
            other => AuthType::Other(other),
        }
    }
}

/// AUTH_REQUEST body: `u8 auth_type` followed by the salt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Requested scheme
    pub auth_type: AuthType,
    /// Salt bytes (the rest of the body)
    pub salt: Bytes,
}

impl AuthRequest {
    pub(crate) fn body_len(&self) -> usize {
        1 + self.salt.len()
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.auth_type.code());
        buf.put_slice(&self.salt);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let auth_type = AuthType::from(get_u8(buf)?);
        let salt = get_bytes(buf, buf.len())?;
        Ok(Self { auth_type, salt })
    }
}

/// AUTH_REPLY body: `u32 username_len`, username, credential (the rest of the body)
///
/// The credential is forwarded exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthReply {
    /// Username
    pub username: String,
    /// Credential bytes
    pub credential: Bytes,
}

impl AuthReply {
    /// Build a reply from a username and password; empty strings are sent as-is
    pub fn new(username: impl Into<String>, password: impl AsRef<[u8]>) -> Self {
        Self {
            username: username.into(),
            credential: Bytes::copy_from_slice(password.as_ref()),
        }
    }

    pub(crate) fn body_len(&self) -> usize {
        4 + self.username.len() + self.credential.len()
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.username.len() as u32);
        buf.put_slice(self.username.as_bytes());
        buf.put_slice(&self.credential);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let username_len = get_u32(buf)? as usize;
        let raw = get_bytes(buf, username_len)?;
        let username = String::from_utf8_lossy(&raw).into_owned();
        let credential = get_bytes(buf, buf.len())?;
        Ok(Self {
            username,
            credential,
        })
    }
}

/// AUTH_STATUS body: `u8 ok` followed by a message (the rest of the body)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether the credentials were accepted
    pub ok: bool,
    /// Backend explanation
    pub message: String,
}

impl AuthStatus {
    pub(crate) fn body_len(&self) -> usize {
        1 + self.message.len()
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.ok));
        buf.put_slice(self.message.as_bytes());
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let ok = get_u8(buf)? != 0;
        let raw = get_bytes(buf, buf.len())?;
        Ok(Self {
            ok,
            message: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_reply_layout() {
        let reply = AuthReply::new("admin", "secret");
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[4..9], b"admin");
        assert_eq!(&buf[9..], b"secret");
        assert_eq!(buf.len(), reply.body_len());
    }

    #[test]
    fn test_empty_credentials() {
        let reply = AuthReply::new("", "");
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 0]);

        let mut bytes = buf.freeze();
        assert_eq!(AuthReply::decode(&mut bytes).unwrap(), reply);
    }

    #[test]
    fn test_username_overrun() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 9, b'a']);
        assert!(matches!(
            AuthReply::decode(&mut bytes),
            Err(WireError::Truncated { .. })
        ));
    }
}
