use std::fmt::{Display, Formatter};
use std::str::FromStr;

use mesosync_core::{AppError, AppResult};

use crate::state::Task;

const DOCKER_ADDRESS_LABEL: &str = "Docker.NetworkSettings.IPAddress";
const MESOS_ADDRESS_LABEL: &str = "MesosContainerizer.NetworkSettings.IPAddress";

/// Where a task's service address may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSource {
    /// Container network info of the latest running status.
    NetInfo,
    /// Address published by the Docker containerizer.
    Docker,
    /// Address published by the Mesos containerizer.
    Mesos,
    /// Address of the agent running the task.
    Host,
}

impl AddressSource {
    /// Returns the stable configuration name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetInfo => "netinfo",
            Self::Docker => "docker",
            Self::Mesos => "mesos",
            Self::Host => "host",
        }
    }
}

impl Display for AddressSource {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AddressSource {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "netinfo" => Ok(Self::NetInfo),
            "docker" => Ok(Self::Docker),
            "mesos" => Ok(Self::Mesos),
            "host" => Ok(Self::Host),
            other => Err(AppError::Validation(format!(
                "unknown address source '{other}', expected one of netinfo, docker, mesos, host"
            ))),
        }
    }
}

/// Ordered list of address sources consulted for every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOrder(Vec<AddressSource>);

impl AddressOrder {
    /// Parses and validates source names.
    pub fn parse(names: &[String]) -> AppResult<Self> {
        let sources = names
            .iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| name.parse::<AddressSource>())
            .collect::<AppResult<Vec<_>>>()?;
        if sources.is_empty() {
            return Err(AppError::Validation(
                "address source order must name at least one source".to_owned(),
            ));
        }

        Ok(Self(sources))
    }

    /// Returns the configured sources in order.
    #[must_use]
    pub fn sources(&self) -> &[AddressSource] {
        self.0.as_slice()
    }

    /// Returns the first non-empty address, falling back to the agent host.
    #[must_use]
    pub fn resolve(&self, task: &Task, agent_host: &str) -> Option<String> {
        self.0
            .iter()
            .find_map(|source| lookup(*source, task, agent_host))
            .or_else(|| non_empty(agent_host))
    }
}

impl Default for AddressOrder {
    fn default() -> Self {
        Self(vec![
            AddressSource::NetInfo,
            AddressSource::Mesos,
            AddressSource::Host,
        ])
    }
}

fn lookup(source: AddressSource, task: &Task, agent_host: &str) -> Option<String> {
    match source {
        AddressSource::NetInfo => task
            .running_status()
            .and_then(|status| status.network_address())
            .and_then(non_empty),
        AddressSource::Docker => task
            .running_status()
            .and_then(|status| status.label(DOCKER_ADDRESS_LABEL))
            .and_then(non_empty),
        AddressSource::Mesos => task
            .running_status()
            .and_then(|status| status.label(MESOS_ADDRESS_LABEL))
            .and_then(non_empty),
        AddressSource::Host => non_empty(agent_host),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}
