//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod consul_service_registry;
mod http_master_state_client;
mod zookeeper_coordination_client;

pub use consul_service_registry::{ConsulRegistryOptions, ConsulServiceRegistry};
pub use http_master_state_client::HttpMasterStateClient;
pub use zookeeper_coordination_client::{ZookeeperCoordinationClient, ZookeeperUri};
