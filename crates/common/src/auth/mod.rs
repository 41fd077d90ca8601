//! Authorization credential passed to every service call

use std::fmt;

/// Bearer token presented to the proposal tool
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Raw token, for building request headers
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Authorization` header
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value() {
        let credential = Credential::bearer("abc123");
        assert_eq!(credential.header_value(), "Bearer abc123");
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::bearer("s3cret");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("redacted"));
    }
}
