use std::collections::HashMap;

use mesosync_domain::ServiceDescriptor;

/// Bookkeeping for one registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    service: ServiceDescriptor,
    seen: bool,
    misses: u32,
}

impl CacheEntry {
    /// Returns the last registered descriptor.
    #[must_use]
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Returns whether the entry was observed during the current cycle.
    #[must_use]
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Returns the number of consecutive cycles the entry went unobserved.
    #[must_use]
    pub fn misses(&self) -> u32 {
        self.misses
    }
}

/// Services this process believes are registered, keyed by service id.
///
/// Entries are marked while a cycle runs; the sweep at the end of the cycle
/// ages every unmarked entry.
#[derive(Debug, Clone)]
pub struct ServiceCache {
    entries: HashMap<String, CacheEntry>,
    miss_threshold: u32,
}

impl ServiceCache {
    /// Creates an empty cache. A threshold of zero is treated as one.
    #[must_use]
    pub fn new(miss_threshold: u32) -> Self {
        Self {
            entries: HashMap::new(),
            miss_threshold: miss_threshold.max(1),
        }
    }

    /// Returns the number of consecutive misses that trigger deregistration.
    #[must_use]
    pub fn miss_threshold(&self) -> u32 {
        self.miss_threshold
    }

    /// Returns the cached descriptor for an id.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.entries.get(id).map(CacheEntry::service)
    }

    /// Returns the full entry for an id.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Marks an entry as observed this cycle and resets its miss counter.
    ///
    /// Returns `false` when the id is not cached.
    pub fn mark(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.seen = true;
                entry.misses = 0;
                true
            }
            None => false,
        }
    }

    /// Removes an entry.
    pub fn delete(&mut self, id: &str) -> Option<ServiceDescriptor> {
        self.entries.remove(id).map(|entry| entry.service)
    }

    /// Stores a service that was just registered, marked as seen.
    pub fn insert_registered(&mut self, service: ServiceDescriptor) {
        self.entries.insert(
            service.id().to_owned(),
            CacheEntry {
                service,
                seen: true,
                misses: 0,
            },
        );
    }

    /// Stores a service found in the registry at startup.
    ///
    /// Seeded entries start unseen so they age like any other entry. Ids that
    /// are already cached are left untouched and `false` is returned.
    pub fn seed(&mut self, service: ServiceDescriptor) -> bool {
        if self.entries.contains_key(service.id()) {
            return false;
        }

        self.entries.insert(
            service.id().to_owned(),
            CacheEntry {
                service,
                seen: false,
                misses: 0,
            },
        );
        true
    }

    /// Clears every seen flag before a new cycle starts.
    pub fn begin_cycle(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seen = false;
        }
    }

    /// Ages every entry not seen this cycle and returns those due for removal.
    ///
    /// Due entries stay cached until [`ServiceCache::delete`] is called, so a
    /// failed deregistration is retried by the next sweep.
    pub fn sweep_candidates(&mut self) -> Vec<ServiceDescriptor> {
        let threshold = self.miss_threshold;
        let mut due = self
            .entries
            .values_mut()
            .filter(|entry| !entry.seen)
            .filter_map(|entry| {
                entry.misses = entry.misses.saturating_add(1);
                (entry.misses >= threshold).then(|| entry.service.clone())
            })
            .collect::<Vec<_>>();
        due.sort_by(|left, right| left.id().cmp(right.id()));
        due
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether an id is cached.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}
