use async_trait::async_trait;
use mesosync_application::MasterStateSource;
use mesosync_core::{AppError, AppResult, HostPort};
use mesosync_domain::ClusterState;
use tracing::debug;

const STATE_PATH: &str = "/master/state.json";

/// Reads the master state document over plain HTTP.
pub struct HttpMasterStateClient {
    http_client: reqwest::Client,
}

impl HttpMasterStateClient {
    /// Creates a state client on top of a configured HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

fn state_url(master: &HostPort) -> String {
    format!("http://{master}{STATE_PATH}")
}

#[async_trait]
impl MasterStateSource for HttpMasterStateClient {
    async fn fetch_state(&self, master: &HostPort) -> AppResult<ClusterState> {
        let url = state_url(master);
        let response = self
            .http_client
            .get(url.as_str())
            .send()
            .await
            .map_err(|error| AppError::Unreachable(format!("GET {url} failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Unreachable(format!(
                "GET {url} returned status {status}"
            )));
        }

        let body = response.bytes().await.map_err(|error| {
            AppError::Unreachable(format!("reading state from {url} failed: {error}"))
        })?;
        debug!(url = %url, bytes = body.len(), "fetched master state");

        serde_json::from_slice::<ClusterState>(&body)
            .map_err(|error| AppError::Decode(format!("invalid state document from {url}: {error}")))
    }
}
