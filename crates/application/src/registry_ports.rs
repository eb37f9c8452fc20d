use async_trait::async_trait;
use mesosync_core::AppResult;
use mesosync_domain::ServiceDescriptor;

/// Port for the external service registry.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Registers or replaces one service under its identifier.
    async fn register(&self, service: &ServiceDescriptor) -> AppResult<()>;

    /// Removes one service from the agent that owns it.
    async fn deregister(&self, service: &ServiceDescriptor) -> AppResult<()>;

    /// Lists registered services whose identifier carries `id_prefix`.
    ///
    /// `registry_host` names the host whose registry agent answers the query.
    async fn list_services(
        &self,
        registry_host: &str,
        id_prefix: &str,
    ) -> AppResult<Vec<ServiceDescriptor>>;
}
