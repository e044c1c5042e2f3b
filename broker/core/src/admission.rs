//! Decides whether a pod is wired to the credential proxy and produces the patch that does so.
//!
//! A pod is only mutated when its service account's annotated role is also present in the
//! operator-managed allow-list for that service account. Every other outcome admits the pod
//! unchanged: this controller never blocks scheduling.

use crate::{
    identity::TargetRoles,
    inject::{self, Sidecar},
    patch,
    secret::{SecretRef, Secrets},
    store::{StoreError, TokenRecord, TokenStore},
    token::AuthToken,
};
use chrono::{Duration, Utc};
use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// An admission request, reduced to what the controller inspects.
#[derive(Clone, Debug)]
pub struct Request {
    pub kind: String,
    pub operation: String,
    pub namespace: String,
    pub object: Option<Value>,
}

#[derive(Debug)]
pub enum Injection {
    /// The pod was wired to the credential proxy.
    Mutated(Patch),

    /// The request is not a pod creation.
    Skipped,

    /// The pod is admitted unchanged.
    Denied(Denial),
}

#[derive(Debug, Error)]
pub enum Denial {
    #[error("no allow-list entry for service account {0}")]
    NoAllowedRoles(String),

    #[error("service account {0} has no target role")]
    NoTargetRole(String),

    #[error("role {role} is not allowed for service account {sa}")]
    RoleNotAllowed { sa: String, role: String },

    #[error("failed to read allow-list: {0}")]
    Lookup(#[source] StoreError),

    #[error("failed to create token secret: {0}")]
    CreateSecret(#[source] anyhow::Error),

    #[error("failed to store token record: {0}")]
    StoreToken(#[source] StoreError),

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

pub struct Injector<S, K> {
    store: S,
    cluster: K,
    sidecar: Sidecar,
    token_ttl: Duration,
}

// === impl Injection ===

impl Injection {
    /// Returns the patch to apply, if any.
    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Self::Mutated(patch) if !patch.0.is_empty() => Some(patch),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Mutated(_) => "mutated",
            Self::Skipped => "skipped",
            Self::Denied(_) => "denied",
        }
    }
}

// === impl Injector ===

impl<S, K> Injector<S, K>
where
    S: TokenStore + Send + Sync,
    K: TargetRoles + Secrets + Send + Sync,
{
    pub fn new(store: S, cluster: K, sidecar: Sidecar, token_ttl: Duration) -> Self {
        Self {
            store,
            cluster,
            sidecar,
            token_ttl,
        }
    }

    #[instrument(skip_all, fields(ns = %req.namespace, op = %req.operation))]
    pub async fn admit(&self, req: &Request) -> Injection {
        if req.kind != "Pod" || req.operation != "CREATE" {
            debug!(kind = %req.kind, "Not a pod creation");
            return Injection::Skipped;
        }

        let Some(pod) = req.object.as_ref() else {
            warn!("Pod creation request has no object");
            return Injection::Skipped;
        };

        match self.inject(&req.namespace, pod).await {
            Ok(patch) => {
                info!(ops = patch.0.len(), "Injected credential proxy");
                Injection::Mutated(patch)
            }
            Err(denial) => {
                match &denial {
                    Denial::NoAllowedRoles(_) | Denial::NoTargetRole(_) => {
                        debug!(%denial, "Not injecting")
                    }
                    Denial::RoleNotAllowed { .. } => info!(%denial, "Not injecting"),
                    error => error!(%error, "Failed to inject credential proxy"),
                }
                Injection::Denied(denial)
            }
        }
    }

    async fn inject(&self, ns: &str, pod: &Value) -> Result<Patch, Denial> {
        let sa = inject::service_account(pod);

        let allowed = self
            .store
            .allowed_roles(ns, sa)
            .await
            .map_err(Denial::Lookup)?
            .filter(|roles| !roles.is_empty())
            .ok_or_else(|| Denial::NoAllowedRoles(sa.to_string()))?;
        debug!(roles = ?allowed, %sa, "Found allowed roles");

        let role = self
            .cluster
            .target_role(ns, sa)
            .await?
            .ok_or_else(|| Denial::NoTargetRole(sa.to_string()))?;
        if !allowed.contains(&role) {
            return Err(Denial::RoleNotAllowed {
                sa: sa.to_string(),
                role,
            });
        }

        let token = AuthToken::generate();
        let secret = self
            .cluster
            .create(ns, &token)
            .await
            .map_err(Denial::CreateSecret)?;
        debug!(%secret, "Created token secret");

        let record = TokenRecord {
            token,
            role,
            secret: secret.clone(),
            namespace: ns.to_string(),
            service_account: sa.to_string(),
            expires: Utc::now() + self.token_ttl,
        };
        if let Err(error) = self.store.insert(record).await {
            self.rollback(ns, &secret).await;
            return Err(Denial::StoreToken(error));
        }

        let patch = inject::inject(pod, &secret, &self.sidecar)
            .and_then(|mutated| Ok(patch::diff(pod, &mutated)?));
        match patch {
            Ok(patch) => Ok(patch),
            Err(error) => {
                // The stored token is only reachable through the secret.
                self.rollback(ns, &secret).await;
                Err(Denial::Fault(error))
            }
        }
    }

    async fn rollback(&self, ns: &str, secret: &SecretRef) {
        match self.cluster.delete(ns, secret).await {
            Ok(()) => info!(%secret, "Removed token secret"),
            Err(error) => error!(%error, %secret, "Failed to remove token secret"),
        }
    }
}
