//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod address;
mod admission;
mod check;
mod master;
mod naming;
mod policy;
mod service;
mod state;
mod tags;

pub use address::{AddressOrder, AddressSource};
pub use admission::AdmissionPolicy;
pub use check::{
    CheckKind, DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_TIMEOUT, HealthCheck, derive_check,
};
pub use master::{
    ClusterMembership, MasterInfo, MasterRecord, ParticipantNode, PayloadEncoding,
    select_leader_node,
};
pub use naming::NameNormalizer;
pub use policy::{RegistrationPolicy, RegistrationPolicyInput};
pub use service::{
    ServiceDescriptor, ServiceDescriptorInput, derive_agent_service_id, derive_master_service_id,
    derive_task_service_id, has_service_id_prefix,
};
pub use state::{
    Agent, ClusterState, ContainerStatus, DiscoveryInfo, DiscoveryPort, DiscoveryPorts, Framework,
    IpAddress, Label, NetworkInfo, Resources, Task, TaskState, TaskStatus, parse_port_ranges,
};
pub use tags::TagRuleSet;
