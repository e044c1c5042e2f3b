use crate::{
    credentials::{AssumeRole, CredentialSet, SessionDuration},
    store::{StoreError, TokenStore},
    token::AuthToken,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, instrument};

/// Credentials are cached by clients until this long before they expire.
const CACHE_MARGIN_SECS: i64 = 300;

/// Trades tokens issued at admission for temporary role credentials.
///
/// Nothing is written or cached: every exchange mints a fresh credential set.
pub struct Exchange<S, A> {
    store: S,
    assumer: A,
    duration: SessionDuration,
}

#[derive(Debug)]
pub struct Exchanged {
    pub credentials: CredentialSet,

    /// How long the caller may cache the credentials, or `None` if they must not be cached.
    pub max_age: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no authorization token")]
    NotAuthorized,

    #[error("unknown authorization token")]
    NotFound,

    #[error("failed to look up token: {0}")]
    Store(#[from] StoreError),

    #[error("failed to assume role: {0}")]
    AssumeRole(#[source] anyhow::Error),
}

// === impl Exchange ===

impl<S, A> Exchange<S, A>
where
    S: TokenStore + Send + Sync,
    A: AssumeRole + Send + Sync,
{
    pub fn new(store: S, assumer: A, duration: SessionDuration) -> Self {
        Self {
            store,
            assumer,
            duration,
        }
    }

    #[instrument(skip_all)]
    pub async fn exchange(
        &self,
        token: Option<AuthToken>,
        now: DateTime<Utc>,
    ) -> Result<Exchanged, ExchangeError> {
        let res = self.resolve(token, now).await;
        match &res {
            Ok(_) | Err(ExchangeError::NotAuthorized | ExchangeError::NotFound) => {}
            Err(ExchangeError::Store(StoreError::MissingTable(table))) => {
                error!(%table, "Token table does not exist")
            }
            Err(error) => error!(%error, "Unexpected error"),
        }
        res
    }

    async fn resolve(
        &self,
        token: Option<AuthToken>,
        now: DateTime<Utc>,
    ) -> Result<Exchanged, ExchangeError> {
        let token = token.ok_or(ExchangeError::NotAuthorized)?;
        let role = self
            .store
            .role_for_token(&token)
            .await?
            .ok_or(ExchangeError::NotFound)?;
        debug!(%role, "Assuming role");

        let credentials = self
            .assumer
            .assume_role(&role, &token.session_name(), self.duration)
            .await
            .map_err(ExchangeError::AssumeRole)?;
        let max_age = max_age(credentials.expiration, now, self.duration);
        debug!(expiration = %credentials.expiration, ?max_age, "Assumed role");

        Ok(Exchanged {
            credentials,
            max_age,
        })
    }
}

/// Computes how long credentials may be cached: until five minutes before they expire, and
/// never longer than the session itself.
pub fn max_age(
    expiration: DateTime<Utc>,
    now: DateTime<Utc>,
    duration: SessionDuration,
) -> Option<u64> {
    let secs = (expiration - now).num_seconds() - CACHE_MARGIN_SECS;
    u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .map(|secs| secs.min(duration.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn max_age_keeps_a_margin() {
        let now = Utc::now();
        let duration = SessionDuration::default();
        assert_eq!(max_age(now + Duration::seconds(1000), now, duration), Some(700));
        assert_eq!(max_age(now + Duration::seconds(900), now, duration), Some(600));
        assert_eq!(max_age(now + Duration::seconds(301), now, duration), Some(1));
    }

    #[test]
    fn max_age_never_goes_negative() {
        let now = Utc::now();
        let duration = SessionDuration::default();
        assert_eq!(max_age(now + Duration::seconds(300), now, duration), None);
        assert_eq!(max_age(now + Duration::seconds(10), now, duration), None);
        assert_eq!(max_age(now - Duration::seconds(10), now, duration), None);
    }

    #[test]
    fn max_age_is_bounded_by_the_session() {
        let now = Utc::now();
        let duration = SessionDuration::from_secs(3600).unwrap();
        assert_eq!(max_age(now + Duration::hours(12), now, duration), Some(3600));
    }
}
