use async_trait::async_trait;
use mesosync_core::{AppResult, HostPort};
use mesosync_domain::ClusterState;

/// Port for fetching the state document of one master.
#[async_trait]
pub trait MasterStateSource: Send + Sync {
    /// Fetches and decodes the state document served by `master`.
    ///
    /// Transport failures map to `AppError::Unreachable` and undecodable
    /// documents to `AppError::Decode`.
    async fn fetch_state(&self, master: &HostPort) -> AppResult<ClusterState>;
}
