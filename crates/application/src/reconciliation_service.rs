use std::sync::Arc;

use mesosync_core::AppResult;
use mesosync_domain::{
    ClusterMembership, RegistrationPolicy, ServiceDescriptor, has_service_id_prefix,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::registry_ports::ServiceRegistry;
use crate::service_cache::ServiceCache;
use crate::state_poller::ClusterSnapshot;

mod derivation;

/// Result of registering one derived service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The id was unknown and has been registered.
    Registered,
    /// The id was cached with the same tags; no registry call was made.
    Unchanged,
    /// The id was cached with different tags and has been registered again.
    Reregistered,
}

/// Result of one deregistration sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries deregistered and evicted from the cache.
    pub deregistered: usize,
    /// Entries whose deregistration failed; they stay cached for the next sweep.
    pub failed: usize,
}

/// Counters describing one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Newly registered services.
    pub registered: usize,
    /// Services registered again after a tag change.
    pub reregistered: usize,
    /// Services found unchanged in the cache.
    pub unchanged: usize,
    /// Tasks, agents or ports skipped during derivation.
    pub skipped: usize,
    /// Services removed by the sweep.
    pub deregistered: usize,
    /// Deregistrations that failed and will be retried.
    pub deregister_failures: usize,
}

impl CycleReport {
    /// Returns the number of registry write calls issued.
    #[must_use]
    pub fn registry_writes(&self) -> usize {
        self.registered + self.reregistered + self.deregistered + self.deregister_failures
    }
}

/// Drives registry state towards the services derived from each snapshot.
pub struct ReconciliationService {
    registry: Arc<dyn ServiceRegistry>,
    policy: RegistrationPolicy,
    cache: Mutex<ServiceCache>,
}

impl ReconciliationService {
    /// Creates a new reconciliation service with a miss threshold of one.
    #[must_use]
    pub fn new(registry: Arc<dyn ServiceRegistry>, policy: RegistrationPolicy) -> Self {
        Self {
            registry,
            policy,
            cache: Mutex::new(ServiceCache::new(1)),
        }
    }

    /// Sets how many consecutive unseen cycles trigger deregistration.
    #[must_use]
    pub fn with_miss_threshold(self, miss_threshold: u32) -> Self {
        Self {
            cache: Mutex::new(ServiceCache::new(miss_threshold)),
            ..self
        }
    }

    /// Returns the registration policy.
    #[must_use]
    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    /// Seeds the cache with services previously registered under this
    /// process's id prefix, as reported by the registry on `registry_host`.
    ///
    /// Returns the number of seeded entries.
    pub async fn load_cache(&self, registry_host: &str) -> AppResult<usize> {
        let prefix = self.policy.service_id_prefix();
        let services = self.registry.list_services(registry_host, prefix).await?;

        let mut cache = self.cache.lock().await;
        let mut seeded = 0;
        for service in services {
            if has_service_id_prefix(service.id(), prefix) && cache.seed(service) {
                seeded += 1;
            }
        }
        drop(cache);

        info!(registry_host = %registry_host, seeded, "pre-loaded service cache");
        Ok(seeded)
    }

    /// Returns the cached descriptor for an id.
    pub async fn cache_lookup(&self, id: &str) -> Option<ServiceDescriptor> {
        self.cache.lock().await.lookup(id).cloned()
    }

    /// Marks a cached id as observed this cycle.
    pub async fn cache_mark(&self, id: &str) -> bool {
        self.cache.lock().await.mark(id)
    }

    /// Evicts an id from the cache without contacting the registry.
    pub async fn cache_delete(&self, id: &str) -> Option<ServiceDescriptor> {
        self.cache.lock().await.delete(id)
    }

    /// Returns the number of cached entries.
    pub async fn cached_services(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Registers one derived service unless the cache already holds it with
    /// the same tags.
    pub async fn register(&self, service: &ServiceDescriptor) -> AppResult<RegisterOutcome> {
        let cached = self.cache_lookup(service.id()).await;

        let outcome = match cached {
            Some(cached) if cached.has_same_tags(service) => {
                self.cache_mark(service.id()).await;
                return Ok(RegisterOutcome::Unchanged);
            }
            Some(_) => RegisterOutcome::Reregistered,
            None => RegisterOutcome::Registered,
        };

        self.registry.register(service).await?;
        self.cache.lock().await.insert_registered(service.clone());

        info!(
            service_id = %service.id(),
            service_name = %service.name(),
            agent = %service.agent(),
            outcome = ?outcome,
            "registered service"
        );
        Ok(outcome)
    }

    /// Deregisters every cached entry that reached the miss threshold.
    ///
    /// A failed deregistration leaves its entry cached and does not stop the
    /// sweep.
    pub async fn deregister(&self) -> AppResult<SweepReport> {
        let due = self.cache.lock().await.sweep_candidates();

        let mut report = SweepReport::default();
        for service in due {
            match self.registry.deregister(&service).await {
                Ok(()) => {
                    self.cache_delete(service.id()).await;
                    report.deregistered += 1;
                    info!(
                        service_id = %service.id(),
                        agent = %service.agent(),
                        "deregistered service"
                    );
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        service_id = %service.id(),
                        agent = %service.agent(),
                        error = %error,
                        "failed to deregister service"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Runs one full cycle: hosts, then tasks, then the sweep.
    ///
    /// A failed registration abandons the cycle before the sweep so entries
    /// are never aged on partial information.
    pub async fn reconcile(
        &self,
        snapshot: &ClusterSnapshot,
        membership: &ClusterMembership,
    ) -> AppResult<CycleReport> {
        self.cache.lock().await.begin_cycle();

        let derived = derivation::derive_services(&self.policy, snapshot.state(), membership);
        let mut report = CycleReport {
            skipped: derived.skipped,
            ..CycleReport::default()
        };

        for service in &derived.services {
            match self.register(service).await? {
                RegisterOutcome::Registered => report.registered += 1,
                RegisterOutcome::Reregistered => report.reregistered += 1,
                RegisterOutcome::Unchanged => report.unchanged += 1,
            }
        }

        let sweep = self.deregister().await?;
        report.deregistered = sweep.deregistered;
        report.deregister_failures = sweep.failed;

        Ok(report)
    }
}

#[cfg(test)]
mod tests;
