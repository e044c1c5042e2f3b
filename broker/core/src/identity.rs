/// Resolves the role a service account asks for.
///
/// The answer is a request, not a grant: it is only honored when the allow-list for the same
/// service account also contains it.
#[async_trait::async_trait]
pub trait TargetRoles {
    /// Returns the role annotated on the service account, or `None` if the service account
    /// or its annotation does not exist.
    async fn target_role(&self, ns: &str, sa: &str) -> anyhow::Result<Option<String>>;
}
