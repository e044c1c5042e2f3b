use crate::{secret::SecretRef, token::AuthToken};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

/// Reads allow-lists and reads/writes token records.
#[async_trait::async_trait]
pub trait TokenStore {
    /// Returns the roles a service account may assume, if an allow-list row exists.
    async fn allowed_roles(&self, ns: &str, sa: &str) -> Result<Option<AllowedRoles>, StoreError>;

    /// Returns the role bound to `token`, if the token is known.
    async fn role_for_token(&self, token: &AuthToken) -> Result<Option<String>, StoreError>;

    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing table does not exist or is not reachable under its configured name.
    #[error("table {0} does not exist")]
    MissingTable(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// The set of roles an operator has allowed for a `(namespace, service account)` pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowedRoles(BTreeSet<String>);

/// A token issued to a single pod, bound to the role it may assume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub token: AuthToken,
    pub role: String,
    pub secret: SecretRef,
    pub namespace: String,
    pub service_account: String,
    pub expires: DateTime<Utc>,
}

// === impl AllowedRoles ===

impl AllowedRoles {
    #[inline]
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowedRoles {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_roles_membership() {
        let roles = ["arn:aws:iam::123456789012:role/a", "arn:aws:iam::123456789012:role/b"]
            .into_iter()
            .collect::<AllowedRoles>();
        assert!(roles.contains("arn:aws:iam::123456789012:role/a"));
        assert!(!roles.contains("arn:aws:iam::123456789012:role/c"));
        assert!(!roles.contains(""));
        assert_eq!(roles.iter().count(), 2);
    }

    #[test]
    fn empty_allow_list_allows_nothing() {
        let roles = AllowedRoles::default();
        assert!(roles.is_empty());
        assert!(!roles.contains("roleA"));
    }
}
