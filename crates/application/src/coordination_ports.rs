use async_trait::async_trait;
use mesosync_core::AppResult;
use tokio::sync::oneshot;

/// Why a children watch fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched node's children changed.
    ChildrenChanged,
    /// The session backing the watch was lost; the watch will not fire again.
    SessionLost,
}

/// One-shot notification armed by [`CoordinationClient::watch_children`].
#[derive(Debug)]
pub struct ChildrenWatch {
    receiver: oneshot::Receiver<WatchEvent>,
}

impl ChildrenWatch {
    /// Creates a watch and the sender used by adapters to fire it.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<WatchEvent>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Waits for the watch to fire.
    ///
    /// A dropped sender counts as a lost session.
    pub async fn fired(self) -> WatchEvent {
        self.receiver.await.unwrap_or(WatchEvent::SessionLost)
    }
}

/// Read-only access to a distributed coordination service.
///
/// Adapters own connection management, including reconnecting after a
/// session expired.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Lists the children of a node and arms a one-shot watch on them.
    async fn watch_children(&self, path: &str) -> AppResult<(Vec<String>, ChildrenWatch)>;

    /// Reads the payload of one node.
    async fn get_data(&self, path: &str) -> AppResult<Vec<u8>>;
}
