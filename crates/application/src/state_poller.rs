use std::sync::Arc;

use mesosync_core::{AppError, AppResult, HostPort};
use mesosync_domain::ClusterState;
use tracing::{debug, info};

use crate::cluster_detector::ClusterView;
use crate::state_ports::MasterStateSource;

/// Cluster state fetched from the master that reported itself as leader.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    leader: HostPort,
    state: ClusterState,
}

impl ClusterSnapshot {
    /// Wraps a fetched state document with the master it came from.
    #[must_use]
    pub fn new(leader: HostPort, state: ClusterState) -> Self {
        Self { leader, state }
    }

    /// Returns the master the state was fetched from.
    #[must_use]
    pub fn leader(&self) -> &HostPort {
        &self.leader
    }

    /// Returns the decoded state document.
    #[must_use]
    pub fn state(&self) -> &ClusterState {
        &self.state
    }
}

/// Fetches the cluster state from the current leader.
#[derive(Clone)]
pub struct StatePoller {
    view: ClusterView,
    source: Arc<dyn MasterStateSource>,
}

impl StatePoller {
    /// Creates a poller reading the leader from the given cluster view.
    #[must_use]
    pub fn new(view: ClusterView, source: Arc<dyn MasterStateSource>) -> Self {
        Self { view, source }
    }

    /// Fetches one snapshot.
    ///
    /// The reported leader is the detected one when it matches the detected
    /// master's endpoint host or PID host. Otherwise the state is fetched once
    /// more from the reported leader and the second answer is used as is.
    pub async fn poll(&self) -> AppResult<ClusterSnapshot> {
        let membership = self.view.current_members();
        let leader = membership.leader().ok_or_else(|| {
            AppError::NoLeader("coordination service reports no elected master".to_owned())
        })?;
        let detected = leader.endpoint().clone();

        let state = self.source.fetch_state(&detected).await?;
        let reported = state.leader_endpoint()?;
        if leader.advertises_host(reported.host()) {
            debug!(leader = %detected, "fetched state from detected leader");
            return Ok(ClusterSnapshot::new(detected, state));
        }

        info!(
            detected = %detected,
            reported = %reported,
            "master reports a different leader, fetching state again"
        );
        let state = self.source.fetch_state(&reported).await?;

        Ok(ClusterSnapshot::new(reported, state))
    }
}

#[cfg(test)]
mod tests;
