//! Application services and ports.

#![forbid(unsafe_code)]

mod cluster_detector;
mod coordination_ports;
mod reconciliation_service;
mod registry_ports;
mod service_cache;
mod state_poller;
mod state_ports;

pub use cluster_detector::{
    ClusterDetector, ClusterView, MIN_DETECTION_CYCLE, STARTUP_LEADER_TIMEOUT,
};
pub use coordination_ports::{ChildrenWatch, CoordinationClient, WatchEvent};
pub use reconciliation_service::{
    CycleReport, ReconciliationService, RegisterOutcome, SweepReport,
};
pub use registry_ports::ServiceRegistry;
pub use service_cache::{CacheEntry, ServiceCache};
pub use state_poller::{ClusterSnapshot, StatePoller};
pub use state_ports::MasterStateSource;
