use anyhow::anyhow;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::{
    error::{ProvideErrorMetadata, SdkError},
    types::AttributeValue,
    Client,
};
use iam_broker_core::{AllowedRoles, AuthToken, StoreError, TokenRecord, TokenStore};
use std::collections::HashMap;
use tracing::debug;

// Allow-list table.
const NAMESPACE: &str = "namespace";
const SERVICE_ACCOUNT: &str = "service_account";
const ALLOWED_ROLES: &str = "allowed_roles";

// Token table.
const AUTH_TOKEN: &str = "auth_token";
const ROLE_ARN: &str = "role_arn";
const SECRET_NAME: &str = "secret_name";
const EXPIRES: &str = "expires";

/// Reads allow-lists from, and reads/writes token records to, DynamoDB.
///
/// Token records carry an `expires` attribute in epoch seconds; the table's TTL setting is
/// expected to sweep expired records.
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
    map_table: String,
    auth_table: String,
}

impl DynamoStore {
    pub fn new(
        config: &SdkConfig,
        map_table: impl Into<String>,
        auth_table: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(config),
            map_table: map_table.into(),
            auth_table: auth_table.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for DynamoStore {
    async fn allowed_roles(&self, ns: &str, sa: &str) -> Result<Option<AllowedRoles>, StoreError> {
        let rsp = self
            .client
            .get_item()
            .table_name(&self.map_table)
            .key(NAMESPACE, AttributeValue::S(ns.to_string()))
            .key(SERVICE_ACCOUNT, AttributeValue::S(sa.to_string()))
            .send()
            .await
            .map_err(|error| store_error(&self.map_table, error))?;

        let Some(item) = rsp.item() else {
            debug!(%ns, %sa, "No allow-list entry");
            return Ok(None);
        };
        Ok(Some(allowed_roles(item)))
    }

    async fn role_for_token(&self, token: &AuthToken) -> Result<Option<String>, StoreError> {
        let rsp = self
            .client
            .get_item()
            .table_name(&self.auth_table)
            .key(AUTH_TOKEN, AttributeValue::S(token.as_str().to_string()))
            .send()
            .await
            .map_err(|error| store_error(&self.auth_table, error))?;

        let Some(item) = rsp.item() else {
            return Ok(None);
        };
        match item.get(ROLE_ARN).map(AttributeValue::as_s) {
            Some(Ok(role)) => Ok(Some(role.clone())),
            _ => Err(StoreError::Unexpected(anyhow!(
                "token record in {} has no {ROLE_ARN}",
                self.auth_table
            ))),
        }
    }

    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.auth_table)
            .set_item(Some(token_item(record)))
            // Tokens are random, but the table is the authority on uniqueness.
            .condition_expression("attribute_not_exists(#token)")
            .expression_attribute_names("#token", AUTH_TOKEN)
            .send()
            .await
            .map_err(|error| store_error(&self.auth_table, error))?;
        Ok(())
    }
}

fn allowed_roles(item: &HashMap<String, AttributeValue>) -> AllowedRoles {
    match item.get(ALLOWED_ROLES) {
        Some(AttributeValue::Ss(roles)) => roles.iter().cloned().collect(),
        Some(AttributeValue::S(role)) => std::iter::once(role.clone()).collect(),
        Some(AttributeValue::L(roles)) => roles
            .iter()
            .filter_map(|role| role.as_s().ok().cloned())
            .collect(),
        _ => AllowedRoles::default(),
    }
}

fn token_item(record: TokenRecord) -> HashMap<String, AttributeValue> {
    let TokenRecord {
        token,
        role,
        secret,
        namespace,
        service_account,
        expires,
    } = record;

    [
        (AUTH_TOKEN, AttributeValue::S(token.as_str().to_string())),
        (NAMESPACE, AttributeValue::S(namespace)),
        (SECRET_NAME, AttributeValue::S(secret.name().to_string())),
        (ROLE_ARN, AttributeValue::S(role)),
        (SERVICE_ACCOUNT, AttributeValue::S(service_account)),
        (EXPIRES, AttributeValue::N(expires.timestamp().to_string())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn store_error<E, R>(table: &str, error: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if error.code() == Some("ResourceNotFoundException") {
        return StoreError::MissingTable(table.to_string());
    }
    StoreError::Unexpected(error.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use iam_broker_core::SecretRef;

    #[test]
    fn reads_string_sets() {
        let item = [(
            ALLOWED_ROLES.to_string(),
            AttributeValue::Ss(vec!["roleA".to_string(), "roleB".to_string()]),
        )]
        .into_iter()
        .collect();
        let roles = allowed_roles(&item);
        assert!(roles.contains("roleA"));
        assert!(roles.contains("roleB"));
        assert!(!roles.contains("roleC"));
    }

    #[test]
    fn rows_without_roles_allow_nothing() {
        let item = [(NAMESPACE.to_string(), AttributeValue::S("app1".to_string()))]
            .into_iter()
            .collect();
        assert!(allowed_roles(&item).is_empty());

        let item = [(ALLOWED_ROLES.to_string(), AttributeValue::Bool(true))]
            .into_iter()
            .collect();
        assert!(allowed_roles(&item).is_empty());
    }

    #[test]
    fn token_items() {
        let token = AuthToken::from("t0k3n".to_string());
        let item = token_item(TokenRecord {
            token,
            role: "roleA".to_string(),
            secret: SecretRef::from("broker-authorization-abc".to_string()),
            namespace: "app1".to_string(),
            service_account: "default".to_string(),
            expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(item.len(), 6);
        assert_eq!(item[AUTH_TOKEN], AttributeValue::S("t0k3n".to_string()));
        assert_eq!(item[ROLE_ARN], AttributeValue::S("roleA".to_string()));
        assert_eq!(
            item[SECRET_NAME],
            AttributeValue::S("broker-authorization-abc".to_string())
        );
        assert_eq!(item[EXPIRES], AttributeValue::N("1893456000".to_string()));
    }
}
