use crate::{Cluster, ServiceAccount};
use anyhow::Result;
use iam_broker_core::TargetRoles;
use kube::{Api, ResourceExt};
use tracing::debug;

#[async_trait::async_trait]
impl TargetRoles for Cluster {
    async fn target_role(&self, ns: &str, sa: &str) -> Result<Option<String>> {
        let api = Api::<ServiceAccount>::namespaced(self.client.clone(), ns);
        let Some(account) = api.get_opt(sa).await? else {
            debug!(%ns, %sa, "Service account not found");
            return Ok(None);
        };

        let role = annotated_role(&account, &self.role_annotation);
        if role.is_none() {
            debug!(%ns, sa = %account.name_any(), annotation = %self.role_annotation, "No role annotation");
        }
        Ok(role)
    }
}

fn annotated_role(sa: &ServiceAccount, annotation: &str) -> Option<String> {
    sa.annotations()
        .get(annotation)
        .map(|role| role.trim())
        .filter(|role| !role.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObjectMeta, DEFAULT_ROLE_ANNOTATION};

    fn sa(annotations: &[(&str, &str)]) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("default".to_string()),
                namespace: Some("app1".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn reads_configured_annotation() {
        let role = "arn:aws:iam::123456789012:role/reader";
        assert_eq!(
            annotated_role(&sa(&[(DEFAULT_ROLE_ANNOTATION, role)]), DEFAULT_ROLE_ANNOTATION),
            Some(role.to_string())
        );
        assert_eq!(
            annotated_role(
                &sa(&[("iam.example.com/role", role)]),
                "iam.example.com/role"
            ),
            Some(role.to_string())
        );
    }

    #[test]
    fn ignores_other_annotations() {
        assert_eq!(
            annotated_role(&sa(&[("example.com/role", "x")]), DEFAULT_ROLE_ANNOTATION),
            None
        );
        assert_eq!(annotated_role(&sa(&[]), DEFAULT_ROLE_ANNOTATION), None);
        assert_eq!(
            annotated_role(&sa(&[(DEFAULT_ROLE_ANNOTATION, " ")]), DEFAULT_ROLE_ANNOTATION),
            None
        );
    }
}
