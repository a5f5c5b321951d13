//! Where authentication answers come from.

use std::fmt;

use tracing::error;

/// A username and password for one backend
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password, sent as typed
    pub password: String,
}

impl Credentials {
    /// Build from a username and password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials when a backend asks for them
pub trait CredentialProvider: Send + Sync {
    /// Credentials to present to `server`
    fn get_credentials(&self, server: &str) -> Credentials;

    /// `server` rejected the last credentials
    fn authentication_failed(&self, server: &str, message: &str);
}

/// Hands out the same credentials to every backend
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Always answer with `credentials`
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_credentials(&self, _server: &str) -> Credentials {
        self.credentials.clone()
    }

    fn authentication_failed(&self, server: &str, message: &str) {
        error!(
            "{} rejected the credentials for user '{}': {}",
            server, self.credentials.username, message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_not_in_debug() {
        let creds = Credentials::new("admin", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("admin"));
        assert!(!shown.contains("hunter2"));
    }
}
