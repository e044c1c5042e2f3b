use crate::token::AuthToken;
use rand::{rngs::OsRng, Rng};
use std::fmt;

const NAME_PREFIX: &str = "broker-authorization-";
const NAME_SUFFIX_LEN: usize = 32;
const NAME_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Manages the namespaced secrets that carry tokens into pods.
#[async_trait::async_trait]
pub trait Secrets {
    /// Stores `token` in a newly named secret in `ns`.
    async fn create(&self, ns: &str, token: &AuthToken) -> anyhow::Result<SecretRef>;

    /// Removes a secret created by [`Secrets::create`].
    async fn delete(&self, ns: &str, secret: &SecretRef) -> anyhow::Result<()>;
}

/// The name of a token-holding secret.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretRef(String);

// === impl SecretRef ===

impl SecretRef {
    /// Picks a fresh name. Names are never derived from the workload so that concurrent pod
    /// creations for one service account cannot collide.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let suffix = (0..NAME_SUFFIX_LEN)
            .map(|_| char::from(NAME_CHARS[rng.gen_range(0..NAME_CHARS.len())]))
            .collect::<String>();
        Self(format!("{NAME_PREFIX}{suffix}"))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecretRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
