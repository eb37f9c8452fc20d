//! Leader detection over a coordination service.
//!
//! Masters register ephemeral sequential nodes under one election path. The
//! node with the lowest sequence is the leader. The detector re-reads the
//! whole roster on every children change and publishes a fresh
//! [`ClusterMembership`] through a watch channel, so readers never observe a
//! half-updated roster.

use std::sync::Arc;
use std::time::Duration;

use mesosync_core::{AppError, AppResult, HostPort};
use mesosync_domain::{
    ClusterMembership, MasterInfo, MasterRecord, ParticipantNode, select_leader_node,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coordination_ports::{CoordinationClient, WatchEvent};

/// Upper bound on waiting for the first leader at startup.
pub const STARTUP_LEADER_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum spacing between two roster evaluations.
pub const MIN_DETECTION_CYCLE: Duration = Duration::from_secs(1);

/// Read handle on the latest published membership.
#[derive(Debug, Clone)]
pub struct ClusterView {
    receiver: watch::Receiver<ClusterMembership>,
}

impl ClusterView {
    #[cfg(test)]
    pub(crate) fn fixed(membership: ClusterMembership) -> Self {
        let (_, receiver) = watch::channel(membership);
        Self { receiver }
    }

    /// Returns the current leader endpoint, or `None` while leaderless.
    #[must_use]
    pub fn current_leader(&self) -> Option<HostPort> {
        self.receiver
            .borrow()
            .leader()
            .map(|leader| leader.endpoint().clone())
    }

    /// Returns a copy of the current roster.
    #[must_use]
    pub fn current_members(&self) -> ClusterMembership {
        self.receiver.borrow().clone()
    }

    /// Waits until a membership newer than the last observed one is published.
    pub async fn changed(&mut self) -> AppResult<()> {
        self.receiver.changed().await.map_err(|_| {
            AppError::Coordination("cluster detector stopped publishing".to_owned())
        })
    }

    async fn wait_for_leader(&mut self) -> AppResult<()> {
        self.receiver
            .wait_for(|membership| membership.leader().is_some())
            .await
            .map(|_| ())
            .map_err(|_| {
                AppError::Coordination(
                    "cluster detector stopped before a leader was elected".to_owned(),
                )
            })
    }
}

/// Watches the election path and keeps the published membership current.
pub struct ClusterDetector {
    client: Arc<dyn CoordinationClient>,
    path: String,
    min_cycle_period: Duration,
    publisher: watch::Sender<ClusterMembership>,
}

impl ClusterDetector {
    /// Creates a detector for one election path.
    #[must_use]
    pub fn new(client: Arc<dyn CoordinationClient>, path: impl Into<String>) -> Self {
        let (publisher, _) = watch::channel(ClusterMembership::leaderless());
        let path = path.into();
        let path = match path.trim_end_matches('/') {
            "" => "/".to_owned(),
            trimmed => trimmed.to_owned(),
        };

        Self {
            client,
            path,
            min_cycle_period: MIN_DETECTION_CYCLE,
            publisher,
        }
    }

    /// Overrides the minimum spacing between roster evaluations.
    #[must_use]
    pub fn with_min_cycle_period(mut self, min_cycle_period: Duration) -> Self {
        self.min_cycle_period = min_cycle_period;
        self
    }

    /// Returns a read handle on the published membership.
    #[must_use]
    pub fn view(&self) -> ClusterView {
        ClusterView {
            receiver: self.publisher.subscribe(),
        }
    }

    /// Starts watching in the background and waits for the first leader.
    ///
    /// Fails with `AppError::Timeout` when no leader is elected within
    /// `timeout`; the background task is stopped in that case.
    pub async fn start(self, timeout: Duration) -> AppResult<(ClusterView, JoinHandle<()>)> {
        let mut view = self.view();
        let path = self.path.clone();
        info!(path = %path, "waiting for initial leader information");

        let handle = tokio::spawn(self.run());
        match tokio::time::timeout(timeout, view.wait_for_leader()).await {
            Ok(Ok(())) => {
                info!(
                    path = %path,
                    leader = ?view.current_leader().map(|leader| leader.to_string()),
                    "initial leader detected"
                );
                Ok((view, handle))
            }
            Ok(Err(error)) => {
                handle.abort();
                Err(error)
            }
            Err(_) => {
                handle.abort();
                Err(AppError::Timeout(format!(
                    "no leader elected under '{path}' within {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Runs the watch loop until every view has been dropped.
    pub async fn run(self) {
        loop {
            let started = Instant::now();

            match self.client.watch_children(self.path.as_str()).await {
                Ok((children, watch)) => {
                    self.evaluate(children).await;
                    match watch.fired().await {
                        WatchEvent::ChildrenChanged => {
                            debug!(path = %self.path, "participant set changed");
                        }
                        WatchEvent::SessionLost => {
                            warn!(path = %self.path, "coordination session lost");
                            self.publish(ClusterMembership::leaderless());
                        }
                    }
                }
                Err(error) => {
                    warn!(path = %self.path, error = %error, "failed to watch participants");
                    self.publish(ClusterMembership::leaderless());
                }
            }

            if self.publisher.is_closed() {
                debug!(path = %self.path, "no membership readers left, stopping detector");
                return;
            }

            if let Some(rest) = self.min_cycle_period.checked_sub(started.elapsed()) {
                tokio::time::sleep(rest).await;
            }
        }
    }

    async fn evaluate(&self, children: Vec<String>) {
        let participants = children
            .iter()
            .filter_map(|child| match ParticipantNode::parse(child) {
                Ok(participant) => participant,
                Err(error) => {
                    warn!(node = %child, error = %error, "skipping participant node");
                    None
                }
            })
            .collect::<Vec<_>>();
        let leader_node = select_leader_node(&participants).map(|node| node.name().to_owned());

        let mut records = Vec::with_capacity(participants.len());
        for participant in &participants {
            match self.read_record(participant).await {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(
                        node = %participant.name(),
                        error = %error,
                        "skipping malformed participant payload"
                    );
                }
            }
        }

        self.publish(ClusterMembership::elect(records, leader_node.as_deref()));
    }

    async fn read_record(&self, participant: &ParticipantNode) -> AppResult<MasterRecord> {
        let node_path = if self.path == "/" {
            format!("/{}", participant.name())
        } else {
            format!("{}/{}", self.path, participant.name())
        };
        let payload = self.client.get_data(node_path.as_str()).await?;
        let info = MasterInfo::decode(participant.encoding(), payload.as_slice())?;

        MasterRecord::from_info(participant, &info)
    }

    fn publish(&self, membership: ClusterMembership) {
        let leader = membership
            .leader()
            .map(|leader| leader.endpoint().to_string());
        let members = membership.members().len();

        let changed = self.publisher.send_if_modified(|current| {
            if *current == membership {
                return false;
            }

            *current = membership;
            true
        });

        if changed {
            match leader {
                Some(leader) => info!(leader = %leader, members, "cluster membership changed"),
                None => warn!(members, "cluster is leaderless"),
            }
        }
    }
}
