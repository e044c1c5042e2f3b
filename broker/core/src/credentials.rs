use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr, time::Duration};

/// Exchanges a role identifier for temporary credentials.
#[async_trait::async_trait]
pub trait AssumeRole {
    async fn assume_role(
        &self,
        role: &str,
        session_name: &str,
        duration: SessionDuration,
    ) -> Result<CredentialSet>;
}

/// Temporary credentials. These are handed to the caller and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

/// How long an assumed-role session lasts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionDuration(Duration);

// === impl CredentialSet ===

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

// === impl SessionDuration ===

impl SessionDuration {
    /// STS accepts sessions between 15 minutes and 12 hours.
    pub const MIN: Self = Self(Duration::from_secs(900));
    pub const MAX: Self = Self(Duration::from_secs(43_200));

    pub fn from_secs(secs: u64) -> Result<Self> {
        let duration = Self(Duration::from_secs(secs));
        if duration < Self::MIN || Self::MAX < duration {
            bail!(
                "session duration must be between {} and {} seconds",
                Self::MIN.as_secs(),
                Self::MAX.as_secs()
            );
        }
        Ok(duration)
    }

    #[inline]
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for SessionDuration {
    fn default() -> Self {
        Self::MIN
    }
}

impl FromStr for SessionDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_secs(s.parse()?)
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_duration_bounds() {
        assert_eq!(SessionDuration::default().as_secs(), 900);
        assert_eq!("3600".parse::<SessionDuration>().unwrap().as_secs(), 3600);
        assert!("899".parse::<SessionDuration>().is_err());
        assert!("43201".parse::<SessionDuration>().is_err());
        assert!("soon".parse::<SessionDuration>().is_err());
    }

    #[test]
    fn debug_omits_secrets() {
        let creds = CredentialSet {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI".to_string(),
            session_token: "FwoGZXIvYXdzE".to_string(),
            expiration: Utc::now(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("wJalrXUtnFEMI"));
        assert!(!debug.contains("FwoGZXIvYXdzE"));
    }
}
