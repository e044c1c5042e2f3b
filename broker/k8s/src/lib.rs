#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Kubernetes-backed implementations of the broker's cluster-facing traits.

mod secret;
mod service_account;

pub use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
pub use kube::{api::ObjectMeta, Client, Error, ResourceExt};

/// The annotation operators use to request a role for a service account, matching the EKS pod
/// identity webhook.
pub const DEFAULT_ROLE_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// Reads service accounts and manages token secrets through the Kubernetes API.
///
/// The client is built once at startup and shared by every request.
#[derive(Clone)]
pub struct Cluster {
    client: Client,
    role_annotation: String,
}

impl Cluster {
    pub fn new(client: Client, role_annotation: impl Into<String>) -> Self {
        Self {
            client,
            role_annotation: role_annotation.into(),
        }
    }
}
