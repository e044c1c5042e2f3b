use crate::{secret::SecretRef, AUTHORIZATION_TOKEN_ENV, CREDENTIALS_URI_ENV};
use anyhow::{anyhow, Result};
use k8s_openapi::{
    api::core::v1::{Container, EnvVar, EnvVarSource, ResourceRequirements, SecretKeySelector},
    apimachinery::pkg::api::resource::Quantity,
};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Describes the credential proxy container added to mutated pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sidecar {
    pub name: String,
    pub image: String,
    pub port: u16,
    pub requests: Resources,
    pub limits: Resources,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resources {
    pub cpu: String,
    pub memory: String,
}

/// Returns the service account a pod runs as.
///
/// The service account admission plugin fills in `serviceAccountName` before mutating webhooks
/// run; an unset name means the namespace default.
pub fn service_account(pod: &Value) -> &str {
    let spec = &pod["spec"];
    spec["serviceAccountName"]
        .as_str()
        .or_else(|| spec["serviceAccount"].as_str())
        .filter(|sa| !sa.is_empty())
        .unwrap_or(DEFAULT_SERVICE_ACCOUNT)
}

/// Returns a copy of `pod` wired to the credential proxy.
///
/// Every existing container is pointed at the proxy and given the token by reference to
/// `secret`; the token itself never appears in the manifest. The proxy container is appended
/// after all existing containers.
pub fn inject(pod: &Value, secret: &SecretRef, sidecar: &Sidecar) -> Result<Value> {
    let env = [
        EnvVar {
            name: CREDENTIALS_URI_ENV.to_string(),
            value: Some(sidecar.credentials_uri()),
            ..Default::default()
        },
        EnvVar {
            name: AUTHORIZATION_TOKEN_ENV.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    key: AUTHORIZATION_TOKEN_ENV.to_string(),
                    name: secret.name().to_string().into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
    .into_iter()
    .map(serde_json::to_value)
    .collect::<serde_json::Result<Vec<_>>>()?;

    let mut mutated = pod.clone();
    let containers = mutated
        .pointer_mut("/spec/containers")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| anyhow!("pod has no spec.containers"))?;

    for container in containers.iter_mut() {
        let container = container
            .as_object_mut()
            .ok_or_else(|| anyhow!("container is not an object"))?;
        let vars = container
            .entry("env")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| anyhow!("container env is not a list"))?;
        vars.extend(env.iter().cloned());
    }

    containers.push(serde_json::to_value(sidecar.container())?);
    Ok(mutated)
}

// === impl Sidecar ===

impl Sidecar {
    fn credentials_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            resources: Some(ResourceRequirements {
                requests: Some(self.requests.quantities()),
                limits: Some(self.limits.quantities()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl Default for Sidecar {
    fn default() -> Self {
        Self {
            name: "ocp-broker-proxy".to_string(),
            image: "image-registry.openshift-image-registry.svc:5000/ocp-iam-broker/ocp-broker-proxy"
                .to_string(),
            port: 53080,
            requests: Resources {
                cpu: "1m".to_string(),
                memory: "15Mi".to_string(),
            },
            limits: Resources {
                cpu: "10m".to_string(),
                memory: "32Mi".to_string(),
            },
        }
    }
}

// === impl Resources ===

impl Resources {
    fn quantities(&self) -> BTreeMap<String, Quantity> {
        [
            ("cpu".to_string(), Quantity(self.cpu.clone())),
            ("memory".to_string(), Quantity(self.memory.clone())),
        ]
        .into_iter()
        .collect()
    }
}
