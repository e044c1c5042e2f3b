//! In-memory implementations of the backend traits.

use crate::{
    AllowedRoles, AssumeRole, AuthToken, CredentialSet, SecretRef, Secrets, SessionDuration,
    StoreError, TargetRoles, TokenRecord, TokenStore,
};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

#[derive(Clone, Default)]
pub struct MemStore(Arc<Mutex<StoreState>>);

#[derive(Default)]
struct StoreState {
    allowed: HashMap<(String, String), AllowedRoles>,
    records: HashMap<AuthToken, TokenRecord>,
    fail_inserts: bool,
    missing_table: bool,
}

#[derive(Clone, Default)]
pub struct MemCluster(Arc<Mutex<ClusterState>>);

#[derive(Default)]
struct ClusterState {
    target_roles: HashMap<(String, String), String>,
    secrets: HashMap<(String, SecretRef), AuthToken>,
    fail_creates: bool,
    fail_deletes: bool,
}

#[derive(Clone)]
pub struct MemAssumer(Arc<Mutex<AssumerState>>);

struct AssumerState {
    expiration: DateTime<Utc>,
    calls: Vec<(String, String, SessionDuration)>,
    fail: bool,
}

// === impl MemStore ===

impl MemStore {
    pub fn allow(&self, ns: &str, sa: &str, roles: &[&str]) {
        self.0.lock().allowed.insert(
            (ns.to_string(), sa.to_string()),
            roles.iter().copied().collect(),
        );
    }

    pub fn records(&self) -> Vec<TokenRecord> {
        self.0.lock().records.values().cloned().collect()
    }

    /// Records a token bound to `role` for `default` in `app1`, as an admission would.
    pub fn issue(&self, role: &str) -> AuthToken {
        let token = AuthToken::generate();
        self.0.lock().records.insert(
            token.clone(),
            TokenRecord {
                token: token.clone(),
                role: role.to_string(),
                secret: SecretRef::generate(),
                namespace: "app1".to_string(),
                service_account: "default".to_string(),
                expires: Utc::now() + Duration::days(14),
            },
        );
        token
    }

    pub fn fail_inserts(&self) {
        self.0.lock().fail_inserts = true;
    }

    pub fn drop_table(&self) {
        self.0.lock().missing_table = true;
    }
}

#[async_trait::async_trait]
impl TokenStore for MemStore {
    async fn allowed_roles(&self, ns: &str, sa: &str) -> Result<Option<AllowedRoles>, StoreError> {
        let state = self.0.lock();
        if state.missing_table {
            return Err(StoreError::MissingTable("mapped_roles".to_string()));
        }
        Ok(state.allowed.get(&(ns.to_string(), sa.to_string())).cloned())
    }

    async fn role_for_token(&self, token: &AuthToken) -> Result<Option<String>, StoreError> {
        let state = self.0.lock();
        if state.missing_table {
            return Err(StoreError::MissingTable("role_perms".to_string()));
        }
        Ok(state.records.get(token).map(|r| r.role.clone()))
    }

    async fn insert(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut state = self.0.lock();
        if state.fail_inserts {
            return Err(StoreError::Unexpected(anyhow!("throughput exceeded")));
        }
        if state.records.contains_key(&record.token) {
            return Err(StoreError::Unexpected(anyhow!("token already exists")));
        }
        state.records.insert(record.token.clone(), record);
        Ok(())
    }
}

// === impl MemCluster ===

impl MemCluster {
    pub fn annotate(&self, ns: &str, sa: &str, role: &str) {
        self.0
            .lock()
            .target_roles
            .insert((ns.to_string(), sa.to_string()), role.to_string());
    }

    pub fn secrets(&self, ns: &str) -> Vec<(SecretRef, AuthToken)> {
        self.0
            .lock()
            .secrets
            .iter()
            .filter(|((secret_ns, _), _)| secret_ns == ns)
            .map(|((_, secret), token)| (secret.clone(), token.clone()))
            .collect()
    }

    pub fn fail_creates(&self) {
        self.0.lock().fail_creates = true;
    }

    pub fn fail_deletes(&self) {
        self.0.lock().fail_deletes = true;
    }
}

#[async_trait::async_trait]
impl TargetRoles for MemCluster {
    async fn target_role(&self, ns: &str, sa: &str) -> Result<Option<String>> {
        Ok(self
            .0
            .lock()
            .target_roles
            .get(&(ns.to_string(), sa.to_string()))
            .cloned())
    }
}

#[async_trait::async_trait]
impl Secrets for MemCluster {
    async fn create(&self, ns: &str, token: &AuthToken) -> Result<SecretRef> {
        let mut state = self.0.lock();
        if state.fail_creates {
            bail!("secrets is forbidden");
        }
        let secret = SecretRef::generate();
        state
            .secrets
            .insert((ns.to_string(), secret.clone()), token.clone());
        Ok(secret)
    }

    async fn delete(&self, ns: &str, secret: &SecretRef) -> Result<()> {
        let mut state = self.0.lock();
        if state.fail_deletes {
            bail!("secrets is forbidden");
        }
        state
            .secrets
            .remove(&(ns.to_string(), secret.clone()))
            .map(|_| ())
            .ok_or_else(|| anyhow!("secret {secret} not found"))
    }
}

// === impl MemAssumer ===

impl MemAssumer {
    pub fn expiring_at(expiration: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(AssumerState {
            expiration,
            calls: Vec::new(),
            fail: false,
        })))
    }

    pub fn calls(&self) -> Vec<(String, String, SessionDuration)> {
        self.0.lock().calls.clone()
    }

    pub fn fail(&self) {
        self.0.lock().fail = true;
    }
}

#[async_trait::async_trait]
impl AssumeRole for MemAssumer {
    async fn assume_role(
        &self,
        role: &str,
        session_name: &str,
        duration: SessionDuration,
    ) -> Result<CredentialSet> {
        let mut state = self.0.lock();
        state
            .calls
            .push((role.to_string(), session_name.to_string(), duration));
        if state.fail {
            bail!("AccessDenied: not authorized to perform sts:AssumeRole");
        }
        Ok(CredentialSet {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "session".to_string(),
            expiration: state.expiration,
        })
    }
}
