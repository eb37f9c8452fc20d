use mesosync_core::{AppResult, HostPort};
use mesosync_domain::{
    Agent, ClusterMembership, ClusterState, DEFAULT_CHECK_INTERVAL, Framework, HealthCheck,
    RegistrationPolicy, ServiceDescriptor, ServiceDescriptorInput, Task, derive_agent_service_id,
    derive_check, derive_master_service_id, derive_task_service_id,
};
use tracing::debug;

const MASTER_HEALTH_PATH: &str = "/master/health";
const AGENT_HEALTH_PATH: &str = "/slave(1)/health";

/// Services that should exist after one cycle, hosts first.
#[derive(Debug, Default)]
pub(super) struct DerivedServices {
    pub(super) services: Vec<ServiceDescriptor>,
    pub(super) skipped: usize,
}

impl DerivedServices {
    fn push(&mut self, service: AppResult<ServiceDescriptor>, subject: &str) {
        match service {
            Ok(service) => self.services.push(service),
            Err(error) => self.skip(subject, &error.to_string()),
        }
    }

    fn skip(&mut self, subject: &str, reason: &str) {
        debug!(subject = %subject, reason = %reason, "skipping registration");
        self.skipped += 1;
    }
}

pub(super) fn derive_services(
    policy: &RegistrationPolicy,
    state: &ClusterState,
    membership: &ClusterMembership,
) -> DerivedServices {
    let mut derived = DerivedServices::default();

    for master in membership.members() {
        let tags = if membership.is_leader(master) {
            vec!["leader".to_owned(), "master".to_owned()]
        } else {
            vec!["master".to_owned()]
        };
        derived.push(
            host_service(
                derive_master_service_id(
                    policy.service_id_prefix(),
                    policy.host_service_name(),
                    master.endpoint(),
                ),
                policy,
                master.endpoint(),
                tags,
                MASTER_HEALTH_PATH,
            ),
            master.node(),
        );
    }

    for agent in &state.slaves {
        match agent.endpoint() {
            Ok(endpoint) => derived.push(
                host_service(
                    derive_agent_service_id(
                        policy.service_id_prefix(),
                        policy.host_service_name(),
                        agent.id.as_str(),
                        agent.hostname.as_str(),
                    ),
                    policy,
                    &endpoint,
                    vec!["agent".to_owned(), "follower".to_owned()],
                    AGENT_HEALTH_PATH,
                ),
                agent.id.as_str(),
            ),
            Err(error) => derived.skip(agent.id.as_str(), &error.to_string()),
        }
    }

    for framework in &state.frameworks {
        if !policy.framework_admission().allowed(framework.name.as_str()) {
            derived.skip(framework.name.as_str(), "framework not admitted");
            continue;
        }

        for task in &framework.tasks {
            task_services(policy, state, framework, task, &mut derived);
        }
    }

    derived
}

fn host_service(
    id: String,
    policy: &RegistrationPolicy,
    endpoint: &HostPort,
    tags: Vec<String>,
    health_path: &str,
) -> AppResult<ServiceDescriptor> {
    let check = HealthCheck::http(
        format!("http://{endpoint}{health_path}"),
        DEFAULT_CHECK_INTERVAL,
    );

    ServiceDescriptor::new(ServiceDescriptorInput {
        id,
        name: policy.host_service_name().to_owned(),
        address: endpoint.host().to_owned(),
        port: Some(endpoint.port()),
        tags,
        check: Some(check),
        agent: endpoint.host().to_owned(),
    })
}

fn task_services(
    policy: &RegistrationPolicy,
    state: &ClusterState,
    framework: &Framework,
    task: &Task,
    derived: &mut DerivedServices,
) {
    if !task.is_running() {
        return;
    }
    if !policy.task_admission().allowed(task.name.as_str()) {
        derived.skip(task.name.as_str(), "task not admitted");
        return;
    }

    let Some(agent_host) = state.agent(task.slave_id.as_str()).and_then(task_agent_host) else {
        derived.skip(task.id.as_str(), "task runs on an unknown agent");
        return;
    };
    let Some(address) = policy.address_order().resolve(task, agent_host.as_str()) else {
        derived.skip(task.id.as_str(), "no address resolved");
        return;
    };
    let ports = match task.service_ports() {
        Ok(ports) if ports.is_empty() => {
            derived.skip(task.id.as_str(), "task exposes no ports");
            return;
        }
        Ok(ports) => ports,
        Err(error) => {
            derived.skip(task.id.as_str(), &error.to_string());
            return;
        }
    };

    let name = policy.normalizer().normalize(task.name.as_str());
    let tags = policy
        .tag_rules()
        .apply(task.name.as_str(), task.declared_tags());
    debug!(
        framework = %framework.name,
        task = %task.id,
        service_name = %name,
        ports = ports.len(),
        "deriving task services"
    );

    for port in ports {
        derived.push(
            ServiceDescriptor::new(ServiceDescriptorInput {
                id: derive_task_service_id(
                    policy.service_id_prefix(),
                    agent_host.as_str(),
                    name.as_str(),
                    address.as_str(),
                    port,
                ),
                name: name.clone(),
                address: address.clone(),
                port: Some(port),
                tags: tags.clone(),
                check: Some(derive_check(task, address.as_str(), port)),
                agent: agent_host.clone(),
            }),
            task.id.as_str(),
        );
    }
}

fn task_agent_host(agent: &Agent) -> Option<String> {
    agent
        .endpoint()
        .map(|endpoint| endpoint.host().to_owned())
        .ok()
        .or_else(|| (!agent.hostname.trim().is_empty()).then(|| agent.hostname.clone()))
}
