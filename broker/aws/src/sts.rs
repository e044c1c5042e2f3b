use anyhow::{anyhow, Context, Result};
use aws_config::SdkConfig;
use aws_sdk_sts::Client;
use chrono::{DateTime, Utc};
use iam_broker_core::{AssumeRole, CredentialSet, SessionDuration};

/// Assumes roles through STS using the broker's own credentials.
#[derive(Clone, Debug)]
pub struct StsAssumer {
    client: Client,
}

impl StsAssumer {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait::async_trait]
impl AssumeRole for StsAssumer {
    async fn assume_role(
        &self,
        role: &str,
        session_name: &str,
        duration: SessionDuration,
    ) -> Result<CredentialSet> {
        let rsp = self
            .client
            .assume_role()
            .role_arn(role)
            .role_session_name(session_name)
            .duration_seconds(i32::try_from(duration.as_secs())?)
            .send()
            .await
            .with_context(|| format!("failed to assume {role}"))?;

        let creds = rsp
            .credentials()
            .ok_or_else(|| anyhow!("assume-role response for {role} has no credentials"))?;
        let expiration = creds.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| anyhow!("credential expiration out of range"))?;

        Ok(CredentialSet {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration,
        })
    }
}
