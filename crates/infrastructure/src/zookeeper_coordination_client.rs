use async_trait::async_trait;
use mesosync_application::{ChildrenWatch, CoordinationClient, WatchEvent};
use mesosync_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zookeeper_client as zk;

const ZOOKEEPER_SCHEME: &str = "zk://";
const DEFAULT_ZOOKEEPER_PORT: u16 = 2181;

/// Parsed `zk://host:port,host:port/path` coordination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZookeeperUri {
    servers: Vec<String>,
    path: String,
}

impl ZookeeperUri {
    /// Parses and validates a coordination URI.
    ///
    /// Servers without a port get the ZooKeeper default port.
    pub fn parse(uri: &str) -> AppResult<Self> {
        let uri = uri.trim();
        let rest = uri.strip_prefix(ZOOKEEPER_SCHEME).ok_or_else(|| {
            AppError::Validation(format!("coordination uri '{uri}' must start with zk://"))
        })?;
        let (hosts, path) = rest.split_once('/').ok_or_else(|| {
            AppError::Validation(format!("coordination uri '{uri}' has no path"))
        })?;

        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(AppError::Validation(format!(
                "coordination uri '{uri}' has an empty path"
            )));
        }

        let servers = hosts
            .split(',')
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .map(|server| parse_server(uri, server))
            .collect::<AppResult<Vec<_>>>()?;
        if servers.is_empty() {
            return Err(AppError::Validation(format!(
                "coordination uri '{uri}' names no servers"
            )));
        }

        Ok(Self {
            servers,
            path: format!("/{path}"),
        })
    }

    /// Returns the ensemble connect string.
    #[must_use]
    pub fn connect_string(&self) -> String {
        self.servers.join(",")
    }

    /// Returns the absolute election path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }
}

fn parse_server(uri: &str, server: &str) -> AppResult<String> {
    let Some((host, port)) = server.rsplit_once(':') else {
        return Ok(format!("{server}:{DEFAULT_ZOOKEEPER_PORT}"));
    };

    let port = port.parse::<u16>().map_err(|error| {
        AppError::Validation(format!(
            "coordination uri '{uri}' has invalid port in '{server}': {error}"
        ))
    })?;
    if host.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "coordination uri '{uri}' has an empty host in '{server}'"
        )));
    }

    Ok(format!("{host}:{port}"))
}

/// Read-only ZooKeeper client that reconnects after its session ends.
pub struct ZookeeperCoordinationClient {
    uri: ZookeeperUri,
    session: Mutex<Option<zk::Client>>,
}

impl ZookeeperCoordinationClient {
    /// Creates a client; the session is opened lazily on first use.
    #[must_use]
    pub fn new(uri: ZookeeperUri) -> Self {
        Self {
            uri,
            session: Mutex::new(None),
        }
    }

    /// Returns the URI this client connects to.
    #[must_use]
    pub fn uri(&self) -> &ZookeeperUri {
        &self.uri
    }

    async fn client(&self) -> AppResult<zk::Client> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let connect_string = self.uri.connect_string();
        let client = zk::Client::connect(connect_string.as_str())
            .await
            .map_err(|error| {
                AppError::Coordination(format!(
                    "failed to connect to zookeeper '{connect_string}': {error}"
                ))
            })?;
        info!(servers = %connect_string, "connected to zookeeper");

        *session = Some(client.clone());
        Ok(client)
    }

    async fn fail(&self, operation: &str, path: &str, error: zk::Error) -> AppError {
        if matches!(error, zk::Error::SessionExpired | zk::Error::ClientClosed) {
            warn!(error = %error, "zookeeper session ended, reconnecting on next use");
            self.session.lock().await.take();
        }

        AppError::Coordination(format!("{operation} '{path}' failed: {error}"))
    }
}

#[async_trait]
impl CoordinationClient for ZookeeperCoordinationClient {
    async fn watch_children(&self, path: &str) -> AppResult<(Vec<String>, ChildrenWatch)> {
        let client = self.client().await?;
        let (children, _, watcher) = match client.get_and_watch_children(path).await {
            Ok(result) => result,
            Err(error) => return Err(self.fail("watching children of", path, error).await),
        };

        let (sender, watch) = ChildrenWatch::channel();
        let watched_path = path.to_owned();
        tokio::spawn(async move {
            let event = watcher.changed().await;
            debug!(path = %watched_path, event = ?event.event_type, "zookeeper watch fired");

            let event = match event.event_type {
                zk::EventType::Session => WatchEvent::SessionLost,
                _ => WatchEvent::ChildrenChanged,
            };
            let _ = sender.send(event);
        });

        Ok((children, watch))
    }

    async fn get_data(&self, path: &str) -> AppResult<Vec<u8>> {
        let client = self.client().await?;
        match client.get_data(path).await {
            Ok((data, _)) => Ok(data),
            Err(error) => Err(self.fail("reading", path, error).await),
        }
    }
}
