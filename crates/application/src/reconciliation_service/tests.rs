use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use mesosync_core::{AppError, AppResult, HostPort};
use mesosync_domain::{
    CheckKind, ClusterMembership, ClusterState, MasterInfo, MasterRecord, ParticipantNode,
    PayloadEncoding, RegistrationPolicy, RegistrationPolicyInput, ServiceDescriptor,
    ServiceDescriptorInput,
};

use crate::{ClusterSnapshot, ServiceRegistry};

use super::{CycleReport, ReconciliationService, RegisterOutcome};

const WEB_ID: &str = "mesos-consul:10.0.0.11:web:10.0.0.11:31000";
const AGENT_ONE_ID: &str = "mesos-consul:mesos:S1:agent1.local";
const AGENT_TWO_ID: &str = "mesos-consul:mesos:S2:agent2.local";

#[derive(Debug, Clone, PartialEq, Eq)]
enum RegistryCall {
    Register(String),
    Deregister(String),
}

#[derive(Default)]
struct FakeServiceRegistry {
    calls: Mutex<Vec<RegistryCall>>,
    registered: Mutex<Vec<ServiceDescriptor>>,
    listed: Vec<ServiceDescriptor>,
    fail_register: Mutex<bool>,
    fail_deregister: Mutex<bool>,
}

impl FakeServiceRegistry {
    fn with_listed(listed: Vec<ServiceDescriptor>) -> Self {
        Self {
            listed,
            ..Self::default()
        }
    }

    async fn take_calls(&self) -> Vec<RegistryCall> {
        std::mem::take(&mut *self.calls.lock().await)
    }

    async fn last_registered(&self, id: &str) -> Option<ServiceDescriptor> {
        self.registered
            .lock()
            .await
            .iter()
            .rev()
            .find(|service| service.id() == id)
            .cloned()
    }
}

#[async_trait]
impl ServiceRegistry for FakeServiceRegistry {
    async fn register(&self, service: &ServiceDescriptor) -> AppResult<()> {
        if *self.fail_register.lock().await {
            return Err(AppError::Registry("agent refused registration".to_owned()));
        }

        self.calls
            .lock()
            .await
            .push(RegistryCall::Register(service.id().to_owned()));
        self.registered.lock().await.push(service.clone());
        Ok(())
    }

    async fn deregister(&self, service: &ServiceDescriptor) -> AppResult<()> {
        if *self.fail_deregister.lock().await {
            return Err(AppError::Registry("agent unreachable".to_owned()));
        }

        self.calls
            .lock()
            .await
            .push(RegistryCall::Deregister(service.id().to_owned()));
        Ok(())
    }

    async fn list_services(
        &self,
        _registry_host: &str,
        _id_prefix: &str,
    ) -> AppResult<Vec<ServiceDescriptor>> {
        Ok(self.listed.clone())
    }
}

fn policy_with(input: RegistrationPolicyInput) -> RegistrationPolicy {
    RegistrationPolicy::new(RegistrationPolicyInput {
        service_id_prefix: "mesos-consul".to_owned(),
        host_service_name: "mesos".to_owned(),
        address_order: vec!["netinfo".to_owned(), "mesos".to_owned(), "host".to_owned()],
        ..input
    })
    .unwrap_or_else(|_| unreachable!())
}

fn service(registry: &Arc<FakeServiceRegistry>) -> ReconciliationService {
    ReconciliationService::new(registry.clone(), policy_with(RegistrationPolicyInput::default()))
}

fn web_task(state: &str, labels: Value) -> Value {
    json!({
        "id": "web.4f1c",
        "name": "web",
        "framework_id": "F1",
        "slave_id": "S1",
        "state": state,
        "resources": {"ports": "[31000-31000]"},
        "labels": labels,
        "statuses": [],
    })
}

fn snapshot(tasks: Vec<Value>) -> ClusterSnapshot {
    snapshot_with_framework("marathon", tasks)
}

fn snapshot_with_framework(framework: &str, tasks: Vec<Value>) -> ClusterSnapshot {
    let state = serde_json::from_value::<ClusterState>(json!({
        "leader": "master@10.0.0.1:5050",
        "slaves": [
            {"id": "S1", "hostname": "agent1.local", "pid": "slave(1)@10.0.0.11:5051"},
            {"id": "S2", "hostname": "agent2.local", "pid": "slave(1)@10.0.0.12:5051"},
        ],
        "frameworks": [{"id": "F1", "name": framework, "tasks": tasks}],
    }))
    .unwrap_or_else(|_| unreachable!());
    let leader = HostPort::new("10.0.0.1", 5050).unwrap_or_else(|_| unreachable!());

    ClusterSnapshot::new(leader, state)
}

fn roster() -> ClusterMembership {
    let record = |node: &str, host: &str| {
        let node = ParticipantNode::parse(node)
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        let payload = json!({"id": host, "hostname": host, "port": 5050}).to_string();
        let info = MasterInfo::decode(PayloadEncoding::Json, payload.as_bytes())
            .unwrap_or_else(|_| unreachable!());
        MasterRecord::from_info(&node, &info).unwrap_or_else(|_| unreachable!())
    };

    ClusterMembership::elect(
        vec![
            record("json.info_0000000001", "10.0.0.1"),
            record("json.info_0000000002", "10.0.0.2"),
        ],
        Some("json.info_0000000001"),
    )
}

fn preloaded(id: &str, tags: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor::new(ServiceDescriptorInput {
        id: id.to_owned(),
        name: "web".to_owned(),
        address: "10.0.0.11".to_owned(),
        port: Some(31000),
        tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
        check: None,
        agent: "10.0.0.11".to_owned(),
    })
    .unwrap_or_else(|_| unreachable!())
}

async fn cycle(
    service: &ReconciliationService,
    snapshot: &ClusterSnapshot,
    membership: &ClusterMembership,
) -> CycleReport {
    let report = service.reconcile(snapshot, membership).await;
    assert!(report.is_ok());
    report.unwrap_or_else(|_| unreachable!())
}

fn registered_ids(calls: &[RegistryCall]) -> Vec<&str> {
    calls
        .iter()
        .filter_map(|call| match call {
            RegistryCall::Register(id) => Some(id.as_str()),
            RegistryCall::Deregister(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn steady_state_issues_no_registry_writes_on_second_cycle() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let snapshot = snapshot(vec![web_task("TASK_RUNNING", json!([]))]);
    let membership = ClusterMembership::leaderless();

    let first = cycle(&service, &snapshot, &membership).await;
    assert_eq!(first.registered, 3);
    let calls = registry.take_calls().await;
    assert_eq!(registered_ids(&calls), vec![AGENT_ONE_ID, AGENT_TWO_ID, WEB_ID]);
    assert_eq!(calls.len(), 3);

    let second = cycle(&service, &snapshot, &membership).await;
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.registry_writes(), 0);
    assert!(registry.take_calls().await.is_empty());
}

#[tokio::test]
async fn roster_masters_are_registered_before_agents_and_tasks() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let snapshot = snapshot(vec![web_task("TASK_RUNNING", json!([]))]);

    let report = cycle(&service, &snapshot, &roster()).await;

    assert_eq!(report.registered, 5);
    let calls = registry.take_calls().await;
    assert_eq!(
        registered_ids(&calls),
        vec![
            "mesos-consul:mesos:10.0.0.1:5050",
            "mesos-consul:mesos:10.0.0.2:5050",
            AGENT_ONE_ID,
            AGENT_TWO_ID,
            WEB_ID,
        ]
    );

    let leader = registry
        .last_registered("mesos-consul:mesos:10.0.0.1:5050")
        .await;
    assert_eq!(
        leader.as_ref().map(ServiceDescriptor::tags),
        Some(["leader".to_owned(), "master".to_owned()].as_slice())
    );
    assert_eq!(
        leader
            .as_ref()
            .and_then(ServiceDescriptor::check)
            .map(|check| check.kind().clone()),
        Some(CheckKind::Http(
            "http://10.0.0.1:5050/master/health".to_owned()
        ))
    );

    let standby = registry
        .last_registered("mesos-consul:mesos:10.0.0.2:5050")
        .await;
    assert_eq!(
        standby.as_ref().map(ServiceDescriptor::tags),
        Some(["master".to_owned()].as_slice())
    );

    let agent = registry.last_registered(AGENT_ONE_ID).await;
    assert_eq!(
        agent
            .as_ref()
            .and_then(ServiceDescriptor::check)
            .map(|check| check.kind().clone()),
        Some(CheckKind::Http(
            "http://10.0.0.11:5051/slave(1)/health".to_owned()
        ))
    );
}

#[tokio::test]
async fn vanished_task_is_deregistered_after_one_miss() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let membership = ClusterMembership::leaderless();

    cycle(
        &service,
        &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
        &membership,
    )
    .await;
    registry.take_calls().await;

    let report = cycle(&service, &snapshot(Vec::new()), &membership).await;

    assert_eq!(report.deregistered, 1);
    assert_eq!(
        registry.take_calls().await,
        vec![RegistryCall::Deregister(WEB_ID.to_owned())]
    );
    assert!(service.cache_lookup(WEB_ID).await.is_none());
    assert_eq!(service.cached_services().await, 2);
}

#[tokio::test]
async fn vanished_task_is_deregistered_exactly_once_at_threshold() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry).with_miss_threshold(3);
    let membership = ClusterMembership::leaderless();

    cycle(
        &service,
        &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
        &membership,
    )
    .await;
    registry.take_calls().await;

    let empty = snapshot(Vec::new());
    for _ in 0..2 {
        let report = cycle(&service, &empty, &membership).await;
        assert_eq!(report.registry_writes(), 0);
        assert!(service.cache_lookup(WEB_ID).await.is_some());
    }

    cycle(&service, &empty, &membership).await;
    assert_eq!(
        registry.take_calls().await,
        vec![RegistryCall::Deregister(WEB_ID.to_owned())]
    );

    cycle(&service, &empty, &membership).await;
    assert!(registry.take_calls().await.is_empty());
}

#[tokio::test]
async fn reappearing_task_resets_its_miss_counter() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry).with_miss_threshold(2);
    let membership = ClusterMembership::leaderless();
    let with_task = snapshot(vec![web_task("TASK_RUNNING", json!([]))]);
    let empty = snapshot(Vec::new());

    cycle(&service, &with_task, &membership).await;
    cycle(&service, &empty, &membership).await;
    cycle(&service, &with_task, &membership).await;
    cycle(&service, &empty, &membership).await;

    assert!(registry
        .take_calls()
        .await
        .iter()
        .all(|call| !matches!(call, RegistryCall::Deregister(_))));
    assert!(service.cache_lookup(WEB_ID).await.is_some());
}

#[tokio::test]
async fn tag_change_registers_again_under_same_id() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let membership = ClusterMembership::leaderless();

    cycle(
        &service,
        &snapshot(vec![web_task(
            "TASK_RUNNING",
            json!([{"key": "tags", "value": "blue"}]),
        )]),
        &membership,
    )
    .await;
    registry.take_calls().await;

    let report = cycle(
        &service,
        &snapshot(vec![web_task(
            "TASK_RUNNING",
            json!([{"key": "tags", "value": "green,canary"}]),
        )]),
        &membership,
    )
    .await;

    assert_eq!(report.reregistered, 1);
    assert_eq!(report.unchanged, 2);
    assert_eq!(
        registry.take_calls().await,
        vec![RegistryCall::Register(WEB_ID.to_owned())]
    );
    assert_eq!(
        service
            .cache_lookup(WEB_ID)
            .await
            .map(|cached| cached.tags().to_vec()),
        Some(vec!["green".to_owned(), "canary".to_owned()])
    );
}

#[tokio::test]
async fn register_reports_outcome_per_call() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let web = preloaded(WEB_ID, &["blue"]);

    let first = service.register(&web).await;
    let second = service.register(&web).await;
    let third = service.register(&preloaded(WEB_ID, &["green"])).await;

    assert!(matches!(first, Ok(RegisterOutcome::Registered)));
    assert!(matches!(second, Ok(RegisterOutcome::Unchanged)));
    assert!(matches!(third, Ok(RegisterOutcome::Reregistered)));
    assert_eq!(registry.take_calls().await.len(), 2);
}

#[tokio::test]
async fn preloaded_entries_are_reused_or_aged_out() {
    let registry = Arc::new(FakeServiceRegistry::with_listed(vec![
        preloaded(WEB_ID, &[]),
        preloaded("mesos-consul:10.0.0.11:gone:10.0.0.11:31001", &[]),
        preloaded("other-bridge:10.0.0.11:web:10.0.0.11:31000", &[]),
    ]));
    let service = service(&registry);

    let loaded = service.load_cache("10.0.0.1").await;
    assert!(matches!(loaded, Ok(2)));

    let report = cycle(
        &service,
        &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
        &ClusterMembership::leaderless(),
    )
    .await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.registered, 2);
    let calls = registry.take_calls().await;
    assert_eq!(registered_ids(&calls), vec![AGENT_ONE_ID, AGENT_TWO_ID]);
    assert!(calls.contains(&RegistryCall::Deregister(
        "mesos-consul:10.0.0.11:gone:10.0.0.11:31001".to_owned()
    )));
    assert!(!calls.iter().any(|call| matches!(
        call,
        RegistryCall::Deregister(id) if id.starts_with("other-bridge")
    )));
}

#[tokio::test]
async fn failed_registration_abandons_cycle_before_sweep() {
    let registry = Arc::new(FakeServiceRegistry::with_listed(vec![preloaded(
        "mesos-consul:10.0.0.11:gone:10.0.0.11:31001",
        &[],
    )]));
    let service = service(&registry);
    assert!(service.load_cache("10.0.0.1").await.is_ok());
    *registry.fail_register.lock().await = true;

    let result = service
        .reconcile(
            &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
            &ClusterMembership::leaderless(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Registry(_))));
    assert!(registry.take_calls().await.is_empty());
    assert!(
        service
            .cache_lookup("mesos-consul:10.0.0.11:gone:10.0.0.11:31001")
            .await
            .is_some()
    );
}

#[tokio::test]
async fn failed_deregistration_is_retried_next_cycle() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);
    let membership = ClusterMembership::leaderless();

    cycle(
        &service,
        &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
        &membership,
    )
    .await;
    registry.take_calls().await;

    *registry.fail_deregister.lock().await = true;
    let failed = cycle(&service, &snapshot(Vec::new()), &membership).await;
    assert_eq!(failed.deregister_failures, 1);
    assert!(service.cache_lookup(WEB_ID).await.is_some());

    *registry.fail_deregister.lock().await = false;
    let retried = cycle(&service, &snapshot(Vec::new()), &membership).await;
    assert_eq!(retried.deregistered, 1);
    assert!(service.cache_lookup(WEB_ID).await.is_none());
}

#[tokio::test]
async fn denied_framework_tasks_are_skipped() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = ReconciliationService::new(
        registry.clone(),
        policy_with(RegistrationPolicyInput {
            framework_deny: vec!["^chronos$".to_owned()],
            ..RegistrationPolicyInput::default()
        }),
    );

    let report = cycle(
        &service,
        &snapshot_with_framework("chronos", vec![web_task("TASK_RUNNING", json!([]))]),
        &ClusterMembership::leaderless(),
    )
    .await;

    assert_eq!(report.registered, 2);
    assert!(report.skipped >= 1);
    assert!(service.cache_lookup(WEB_ID).await.is_none());
}

#[tokio::test]
async fn denied_and_non_running_tasks_are_not_registered() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = ReconciliationService::new(
        registry.clone(),
        policy_with(RegistrationPolicyInput {
            task_deny: vec!["^batch".to_owned()],
            ..RegistrationPolicyInput::default()
        }),
    );
    let mut batch = web_task("TASK_RUNNING", json!([]));
    batch["name"] = json!("batch-report");

    let report = cycle(
        &service,
        &snapshot(vec![web_task("TASK_STAGING", json!([])), batch]),
        &ClusterMembership::leaderless(),
    )
    .await;

    assert_eq!(report.registered, 2);
    assert_eq!(
        registered_ids(&registry.take_calls().await),
        vec![AGENT_ONE_ID, AGENT_TWO_ID]
    );
}

#[tokio::test]
async fn task_registration_carries_normalized_name_tags_and_check() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = ReconciliationService::new(
        registry.clone(),
        policy_with(RegistrationPolicyInput {
            task_tags: vec!["web:frontend,public".to_owned()],
            ..RegistrationPolicyInput::default()
        }),
    );
    let mut task = web_task(
        "TASK_RUNNING",
        json!([
            {"key": "tags", "value": "public"},
            {"key": "check_http", "value": "http://{host}:{port}/ping"},
        ]),
    );
    task["name"] = json!("Web_App");

    cycle(&service, &snapshot(vec![task]), &ClusterMembership::leaderless()).await;

    let id = "mesos-consul:10.0.0.11:webapp:10.0.0.11:31000";
    let registered = registry.last_registered(id).await;
    assert!(registered.is_some());
    let registered = registered.unwrap_or_else(|| unreachable!());
    assert_eq!(registered.name(), "webapp");
    assert_eq!(registered.agent(), "10.0.0.11");
    assert_eq!(
        registered.tags(),
        ["public".to_owned(), "frontend".to_owned()].as_slice()
    );
    assert_eq!(
        registered.check().map(|check| check.kind().clone()),
        Some(CheckKind::Http("http://10.0.0.11:31000/ping".to_owned()))
    );
}

#[tokio::test]
async fn task_without_check_labels_gets_tcp_check() {
    let registry = Arc::new(FakeServiceRegistry::default());
    let service = service(&registry);

    cycle(
        &service,
        &snapshot(vec![web_task("TASK_RUNNING", json!([]))]),
        &ClusterMembership::leaderless(),
    )
    .await;

    let registered = registry.last_registered(WEB_ID).await;
    assert_eq!(
        registered
            .as_ref()
            .and_then(ServiceDescriptor::check)
            .map(|check| check.kind().clone()),
        Some(CheckKind::Tcp("10.0.0.11:31000".to_owned()))
    );
}
