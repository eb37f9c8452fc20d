use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use mesosync_core::{AppError, AppResult, HostPort};
use mesosync_domain::{
    ClusterMembership, ClusterState, MasterInfo, MasterRecord, ParticipantNode, PayloadEncoding,
};

use crate::{ClusterView, MasterStateSource};

use super::StatePoller;

#[derive(Default)]
struct FakeStateSource {
    documents: HashMap<String, ClusterState>,
    queried: Mutex<Vec<String>>,
}

impl FakeStateSource {
    fn with_document(mut self, host: &str, reported_leader: &str) -> Self {
        let state = serde_json::from_value::<ClusterState>(json!({
            "leader": format!("master@{reported_leader}:5050"),
            "slaves": [{"id": format!("{host}-agent"), "hostname": "agent.local", "pid": "slave(1)@10.0.0.9:5051"}],
            "frameworks": [],
        }))
        .unwrap_or_else(|_| unreachable!());
        self.documents.insert(host.to_owned(), state);
        self
    }

    async fn queried(&self) -> Vec<String> {
        self.queried.lock().await.clone()
    }
}

#[async_trait]
impl MasterStateSource for FakeStateSource {
    async fn fetch_state(&self, master: &HostPort) -> AppResult<ClusterState> {
        self.queried.lock().await.push(master.host().to_owned());
        self.documents
            .get(master.host())
            .cloned()
            .ok_or_else(|| AppError::Unreachable(format!("connection refused by {master}")))
    }
}

fn view_with_leader(host: &str) -> ClusterView {
    view_with_leader_payload(json!({"id": "master-1", "hostname": host, "port": 5050}))
}

fn view_with_leader_payload(payload: serde_json::Value) -> ClusterView {
    let node = ParticipantNode::parse("json.info_0000000001")
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let payload = payload.to_string();
    let info = MasterInfo::decode(PayloadEncoding::Json, payload.as_bytes())
        .unwrap_or_else(|_| unreachable!());
    let record = MasterRecord::from_info(&node, &info).unwrap_or_else(|_| unreachable!());

    ClusterView::fixed(ClusterMembership::elect(vec![record], Some("json.info_0000000001")))
}

#[tokio::test]
async fn poll_fails_without_leader() {
    let source = Arc::new(FakeStateSource::default());
    let poller = StatePoller::new(ClusterView::fixed(ClusterMembership::leaderless()), source.clone());

    let result = poller.poll().await;

    assert!(matches!(result, Err(AppError::NoLeader(_))));
    assert!(source.queried().await.is_empty());
}

#[tokio::test]
async fn poll_returns_document_from_confirmed_leader() {
    let source = Arc::new(FakeStateSource::default().with_document("10.0.0.1", "10.0.0.1"));
    let poller = StatePoller::new(view_with_leader("10.0.0.1"), source.clone());

    let snapshot = poller.poll().await;
    assert!(snapshot.is_ok());
    let snapshot = snapshot.unwrap_or_else(|_| unreachable!());

    assert_eq!(snapshot.leader().host(), "10.0.0.1");
    assert_eq!(source.queried().await, vec!["10.0.0.1".to_owned()]);
}

#[tokio::test]
async fn poll_accepts_hostname_leader_reported_by_pid_address() {
    let source = Arc::new(
        FakeStateSource::default()
            .with_document("m1.local", "10.0.0.1")
            .with_document("10.0.0.1", "10.0.0.1"),
    );
    let view = view_with_leader_payload(json!({
        "id": "master-1",
        "hostname": "m1.local",
        "port": 5050,
        "pid": "master@10.0.0.1:5050",
    }));
    let poller = StatePoller::new(view, source.clone());

    let snapshot = poller.poll().await;
    assert!(snapshot.is_ok());
    let snapshot = snapshot.unwrap_or_else(|_| unreachable!());

    assert_eq!(snapshot.leader().host(), "m1.local");
    assert_eq!(source.queried().await, vec!["m1.local".to_owned()]);
}

#[tokio::test]
async fn poll_refetches_once_from_reported_leader() {
    let source = Arc::new(
        FakeStateSource::default()
            .with_document("10.0.0.1", "10.0.0.2")
            .with_document("10.0.0.2", "10.0.0.3"),
    );
    let poller = StatePoller::new(view_with_leader("10.0.0.1"), source.clone());

    let snapshot = poller.poll().await;
    assert!(snapshot.is_ok());
    let snapshot = snapshot.unwrap_or_else(|_| unreachable!());

    assert_eq!(snapshot.leader().host(), "10.0.0.2");
    assert_eq!(snapshot.state().slaves[0].id, "10.0.0.2-agent");
    assert_eq!(
        source.queried().await,
        vec!["10.0.0.1".to_owned(), "10.0.0.2".to_owned()]
    );
}

#[tokio::test]
async fn poll_surfaces_unreachable_leader() {
    let source = Arc::new(FakeStateSource::default());
    let poller = StatePoller::new(view_with_leader("10.0.0.1"), source);

    let result = poller.poll().await;

    assert!(matches!(result, Err(AppError::Unreachable(_))));
}

#[tokio::test]
async fn poll_surfaces_failed_refetch() {
    let source = Arc::new(FakeStateSource::default().with_document("10.0.0.1", "10.0.0.2"));
    let poller = StatePoller::new(view_with_leader("10.0.0.1"), source.clone());

    let result = poller.poll().await;

    assert!(matches!(result, Err(AppError::Unreachable(_))));
    assert_eq!(source.queried().await.len(), 2);
}
