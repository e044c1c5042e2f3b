use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::fmt;

const TOKEN_LEN: usize = 64;

// STS limits role session names to 64 characters of `[\w+=,.@-]`.
const MAX_SESSION_NAME_LEN: usize = 64;

/// An opaque bearer token. Possession alone grants the ability to assume the bound role, so the
/// value is never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthToken(String);

impl AuthToken {
    /// Mints a fresh token from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let token = OsRng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Reads a token from an `Authorization` header value.
    ///
    /// The credential proxy sends the raw token, but a `Bearer` scheme is tolerated.
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim_start();
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value)
            .trim();
        if token.is_empty() {
            return None;
        }
        Some(Self(token.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the role session name recorded by the assumption provider, so that assumed
    /// sessions can be traced back to the token that requested them.
    pub fn session_name(&self) -> String {
        self.0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || "_+=,.@-".contains(*c))
            .take(MAX_SESSION_NAME_LEN)
            .collect()
    }
}

impl From<String> for AuthToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthToken").field(&"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = AuthToken::generate();
        let b = AuthToken::generate();
        assert_eq!(a.as_str().len(), TOKEN_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_is_redacted() {
        let token = AuthToken::from("s3cr3t".to_string());
        assert!(!format!("{token:?}").contains("s3cr3t"));
    }

    #[test]
    fn from_header() {
        assert_eq!(
            AuthToken::from_header("abc123").map(|t| t.as_str().to_string()),
            Some("abc123".to_string())
        );
        assert_eq!(
            AuthToken::from_header("Bearer abc123").map(|t| t.as_str().to_string()),
            Some("abc123".to_string())
        );
        assert!(AuthToken::from_header("").is_none());
        assert!(AuthToken::from_header("   ").is_none());
        assert!(AuthToken::from_header("Bearer ").is_none());
    }

    #[test]
    fn session_name_is_bounded() {
        let token = AuthToken::generate();
        assert_eq!(token.session_name(), token.as_str());

        let token = AuthToken::from(format!("{}/{}", "a".repeat(40), "b".repeat(40)));
        let name = token.session_name();
        assert_eq!(name.len(), MAX_SESSION_NAME_LEN);
        assert!(!name.contains('/'));
    }
}
