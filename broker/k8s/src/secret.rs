use crate::{Cluster, ObjectMeta, Secret};
use anyhow::Result;
use iam_broker_core::{AuthToken, SecretRef, Secrets, AUTHORIZATION_TOKEN_ENV};
use kube::{
    api::{DeleteParams, PostParams},
    Api,
};
use tracing::{debug, info};

#[async_trait::async_trait]
impl Secrets for Cluster {
    async fn create(&self, ns: &str, token: &AuthToken) -> Result<SecretRef> {
        let secret = SecretRef::generate();
        let api = Api::<Secret>::namespaced(self.client.clone(), ns);
        let created = api
            .create(&PostParams::default(), &token_secret(ns, &secret, token))
            .await?;
        debug!(%ns, %secret, uid = ?created.metadata.uid, "Created secret");
        Ok(secret)
    }

    async fn delete(&self, ns: &str, secret: &SecretRef) -> Result<()> {
        let api = Api::<Secret>::namespaced(self.client.clone(), ns);
        api.delete(secret.name(), &DeleteParams::default()).await?;
        info!(%ns, %secret, "Deleted secret");
        Ok(())
    }
}

fn token_secret(ns: &str, secret: &SecretRef, token: &AuthToken) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(secret.name().to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(
            [(AUTHORIZATION_TOKEN_ENV.to_string(), token.as_str().to_string())]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    }
}
