//! Dependency tracking for stacked devices.
//!
//! Records which devices wait on which link. There is no deadline: a device
//! whose link never appears waits for the life of the daemon.

use std::collections::{BTreeMap, BTreeSet};

use netdevd_netdev::DependencyClass;

use crate::links::LinkInfo;
use crate::orchestrator::DeviceId;

/// Whether a device of `class` may be created given what is known of its link.
pub fn is_satisfied(class: DependencyClass, link: Option<LinkInfo>) -> bool {
    match class {
        DependencyClass::Independent => true,
        DependencyClass::StackedOnLink => link.is_some(),
        DependencyClass::RequiresAddress => link.is_some_and(|l| l.has_address),
    }
}

/// Devices waiting on links, keyed by link name.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    waiting: BTreeMap<String, BTreeSet<DeviceId>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` as waiting on `link`, replacing any earlier wait.
    pub fn wait(&mut self, device: DeviceId, link: &str) {
        self.cancel(device);
        self.waiting
            .entry(link.to_string())
            .or_default()
            .insert(device);
    }

    /// Stop tracking `device`.
    pub fn cancel(&mut self, device: DeviceId) {
        self.waiting.retain(|_, devices| {
            devices.remove(&device);
            !devices.is_empty()
        });
    }

    /// Devices waiting on `link`, in admission order.
    pub fn waiters(&self, link: &str) -> Vec<DeviceId> {
        self.waiting
            .get(link)
            .map(|devices| devices.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Links that at least one device waits on.
    pub fn links(&self) -> impl Iterator<Item = &str> + '_ {
        self.waiting.keys().map(String::as_str)
    }

    pub fn is_waiting(&self, device: DeviceId) -> bool {
        self.waiting.values().any(|devices| devices.contains(&device))
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
    }
}
