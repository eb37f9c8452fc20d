use std::collections::BTreeSet;

use mesosync_core::{AppError, AppResult, HostPort, NonEmptyString};

use crate::check::HealthCheck;

/// Registry-ready record derived from a task, an agent, or a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    id: NonEmptyString,
    name: NonEmptyString,
    address: NonEmptyString,
    port: Option<u16>,
    tags: Vec<String>,
    check: Option<HealthCheck>,
    agent: NonEmptyString,
}

/// Input payload used to construct a validated service descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptorInput {
    /// Deterministic service identifier.
    pub id: String,
    /// Registry service name.
    pub name: String,
    /// Address the service is reachable on.
    pub address: String,
    /// Optional service port.
    pub port: Option<u16>,
    /// Registry tags, in registration order.
    pub tags: Vec<String>,
    /// Health check, absent only for entries pre-loaded from the registry.
    pub check: Option<HealthCheck>,
    /// Address of the host whose registry agent owns the entry.
    pub agent: String,
}

impl ServiceDescriptor {
    /// Creates a validated service descriptor.
    pub fn new(input: ServiceDescriptorInput) -> AppResult<Self> {
        let ServiceDescriptorInput {
            id,
            name,
            address,
            port,
            tags,
            check,
            agent,
        } = input;

        if port == Some(0) {
            return Err(AppError::Validation(format!(
                "service '{id}' must not use port 0"
            )));
        }

        Ok(Self {
            id: NonEmptyString::new(id)?,
            name: NonEmptyString::new(name)?,
            address: NonEmptyString::new(address)?,
            port,
            tags,
            check,
            agent: NonEmptyString::new(agent)?,
        })
    }

    /// Returns the service identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the registry service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the service address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Returns the service port.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the tags in registration order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        self.tags.as_slice()
    }

    /// Returns the health check.
    #[must_use]
    pub fn check(&self) -> Option<&HealthCheck> {
        self.check.as_ref()
    }

    /// Returns the owning agent address.
    #[must_use]
    pub fn agent(&self) -> &str {
        self.agent.as_str()
    }

    /// Returns whether both descriptors carry the same tag set.
    #[must_use]
    pub fn has_same_tags(&self, other: &Self) -> bool {
        tag_set(&self.tags) == tag_set(&other.tags)
    }
}

fn tag_set(tags: &[String]) -> BTreeSet<&str> {
    tags.iter().map(String::as_str).collect()
}

/// Derives the identifier of one task port registration.
///
/// The result only depends on its inputs so a live task keeps its identifier
/// across refresh cycles.
#[must_use]
pub fn derive_task_service_id(
    prefix: &str,
    agent_address: &str,
    name: &str,
    address: &str,
    port: u16,
) -> String {
    format!("{prefix}:{agent_address}:{name}:{address}:{port}")
}

/// Derives the identifier of one master registration.
#[must_use]
pub fn derive_master_service_id(prefix: &str, service_name: &str, endpoint: &HostPort) -> String {
    format!(
        "{prefix}:{service_name}:{}:{}",
        endpoint.host(),
        endpoint.port()
    )
}

/// Derives the identifier of one agent registration.
#[must_use]
pub fn derive_agent_service_id(
    prefix: &str,
    service_name: &str,
    agent_id: &str,
    hostname: &str,
) -> String {
    format!("{prefix}:{service_name}:{agent_id}:{hostname}")
}

/// Returns whether an identifier was produced under the given prefix.
#[must_use]
pub fn has_service_id_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(':'))
}
