use mesosync_core::{AppError, AppResult, HostPort};
use serde::{Deserialize, Serialize};

/// Point-in-time cluster state reported by the leading master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    /// Leader process identifier, `master@host:port`.
    #[serde(default)]
    pub leader: String,
    /// Registered agents.
    #[serde(default, alias = "agents")]
    pub slaves: Vec<Agent>,
    /// Active frameworks with their tasks.
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

impl ClusterState {
    /// Returns the endpoint of the leader this document claims to come from.
    pub fn leader_endpoint(&self) -> AppResult<HostPort> {
        if self.leader.trim().is_empty() {
            return Err(AppError::Decode(
                "state document does not name a leader".to_owned(),
            ));
        }

        HostPort::parse_pid(self.leader.as_str())
    }

    /// Looks up an agent by its identifier.
    #[must_use]
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.slaves.iter().find(|agent| agent.id == agent_id)
    }
}

/// A worker node running tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable agent identifier.
    pub id: String,
    /// Agent hostname.
    #[serde(default)]
    pub hostname: String,
    /// Agent process identifier, `slave(1)@host:port`.
    #[serde(default)]
    pub pid: String,
}

impl Agent {
    /// Returns the agent endpoint parsed from its process identifier.
    pub fn endpoint(&self) -> AppResult<HostPort> {
        HostPort::parse_pid(self.pid.as_str())
    }
}

/// A scheduler and the tasks it launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    /// Framework identifier.
    #[serde(default)]
    pub id: String,
    /// Framework name.
    #[serde(default)]
    pub name: String,
    /// Tasks owned by the framework.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepted, not yet launched.
    #[serde(rename = "TASK_STAGING")]
    Staging,
    /// Launching.
    #[serde(rename = "TASK_STARTING")]
    Starting,
    /// Running and eligible for registration.
    #[serde(rename = "TASK_RUNNING")]
    Running,
    /// Terminated successfully.
    #[serde(rename = "TASK_FINISHED")]
    Finished,
    /// Terminated with failure.
    #[serde(rename = "TASK_FAILED")]
    Failed,
    /// Killed by the scheduler.
    #[serde(rename = "TASK_KILLED")]
    Killed,
    /// Lost together with its agent.
    #[serde(rename = "TASK_LOST")]
    Lost,
    /// Any state this bridge does not distinguish.
    #[serde(other)]
    Other,
}

/// One key/value task label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label key.
    pub key: String,
    /// Label value.
    #[serde(default)]
    pub value: String,
}

/// Resources assigned to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Port ranges in `[lo-hi, lo-hi]` form.
    #[serde(default)]
    pub ports: Option<String>,
}

/// Explicit service discovery information attached by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    /// Optional discovery name.
    #[serde(default)]
    pub name: Option<String>,
    /// Discovery ports.
    #[serde(default)]
    pub ports: DiscoveryPorts,
}

/// Discovery port list wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPorts {
    /// Declared ports.
    #[serde(default)]
    pub ports: Vec<DiscoveryPort>,
}

/// One declared discovery port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPort {
    /// Port number.
    pub number: u16,
    /// Optional port name.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional protocol.
    #[serde(default)]
    pub protocol: Option<String>,
}

/// One IP address assigned to a container network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    /// Address literal.
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Network attached to a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Addresses on this network.
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
}

/// Container runtime status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Attached networks.
    #[serde(default)]
    pub network_infos: Vec<NetworkInfo>,
}

/// One status update for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Reported state.
    pub state: TaskState,
    /// Status labels, used by container runtimes to publish addresses.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Container network information.
    #[serde(default)]
    pub container_status: Option<ContainerStatus>,
}

impl TaskStatus {
    /// Returns a status label value by exact key.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }

    /// Returns the first container network address.
    #[must_use]
    pub fn network_address(&self) -> Option<&str> {
        self.container_status
            .as_ref()?
            .network_infos
            .iter()
            .flat_map(|network| network.ip_addresses.iter())
            .filter_map(|address| address.ip_address.as_deref())
            .find(|address| !address.trim().is_empty())
    }
}

/// One unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Task name.
    pub name: String,
    /// Owning framework identifier.
    #[serde(default)]
    pub framework_id: String,
    /// Agent running the task.
    #[serde(alias = "agent_id")]
    pub slave_id: String,
    /// Current state.
    pub state: TaskState,
    /// Assigned resources.
    #[serde(default)]
    pub resources: Resources,
    /// Task labels.
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: Vec<Label>,
    /// Explicit discovery information.
    #[serde(default)]
    pub discovery: Option<DiscoveryInfo>,
    /// Status history, oldest first.
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
}

impl Task {
    /// Returns whether the task may be registered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    /// Returns the latest running status update.
    #[must_use]
    pub fn running_status(&self) -> Option<&TaskStatus> {
        self.statuses
            .iter()
            .rev()
            .find(|status| status.state == TaskState::Running)
    }

    /// Returns a label value, matching the key case-insensitively.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key.eq_ignore_ascii_case(key))
            .map(|label| label.value.as_str())
    }

    /// Returns the tags declared through the `tags` label.
    #[must_use]
    pub fn declared_tags(&self) -> Vec<String> {
        self.label("tags")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the ports this task should be registered under.
    ///
    /// Discovery ports win over resource port ranges.
    pub fn service_ports(&self) -> AppResult<Vec<u16>> {
        let discovery_ports = self
            .discovery
            .as_ref()
            .map(|discovery| {
                discovery
                    .ports
                    .ports
                    .iter()
                    .map(|port| port.number)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !discovery_ports.is_empty() {
            return Ok(discovery_ports);
        }

        match self.resources.ports.as_deref() {
            Some(ranges) => parse_port_ranges(ranges),
            None => Ok(Vec::new()),
        }
    }
}

/// Expands a `[lo-hi, lo-hi]` port range expression.
pub fn parse_port_ranges(ranges: &str) -> AppResult<Vec<u16>> {
    let inner = ranges
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut ports = Vec::new();
    for range in inner.split(',') {
        let range = range.trim();
        let (low, high) = range.split_once('-').unwrap_or((range, range));
        let low = parse_port(low.trim(), ranges)?;
        let high = parse_port(high.trim(), ranges)?;
        if low > high {
            return Err(AppError::Decode(format!(
                "port range '{range}' in '{ranges}' is inverted"
            )));
        }

        ports.extend(low..=high);
    }

    Ok(ports)
}

fn parse_port(value: &str, ranges: &str) -> AppResult<u16> {
    value.parse::<u16>().map_err(|error| {
        AppError::Decode(format!("invalid port '{value}' in '{ranges}': {error}"))
    })
}

// Older masters publish labels as `{"labels": [...]}`.
fn deserialize_labels<'de, D>(deserializer: D) -> Result<Vec<Label>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Labels {
        List(Vec<Label>),
        Wrapped { labels: Vec<Label> },
    }

    Ok(match Option::<Labels>::deserialize(deserializer)? {
        Some(Labels::List(labels)) | Some(Labels::Wrapped { labels }) => labels,
        None => Vec::new(),
    })
}
