//! Creation orchestrator.
//!
//! Owns every device configuration and drives it through its lifecycle:
//!
//! ```text
//! Parsed -> Failed                    (verification rejects)
//! Parsed -> WaitingOnDependency       (underlying link unknown or unresolved)
//! Parsed -> Creating                  (independent, or link already resolved)
//! WaitingOnDependency -> Creating     (link becomes resolvable)
//! Creating -> Ready | Failed          (kernel reply, encode or send failure)
//! ```
//!
//! Requests in flight are tracked by sequence number. Removing a device
//! drops its pending records, so a late reply finds nothing and is
//! discarded. Errors for one device never touch another.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use netdevd_netdev::{
    build_create_request, DependencyClass, DeviceStatus, KindRegistry, NetDevConfig,
    UnderlyingLink, Validator, VerifyContext,
};
use netdevd_rtnl::{Errno, Reply, ReplyStatus, DEFAULT_CAPACITY};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::kernel::KernelTransport;
use crate::links::LinkRegistry;
use crate::resolver::{is_satisfied, DependencyResolver};

/// Identity of an admitted device.
///
/// Never reused, so a device re-added under an old name is distinct from
/// its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(u64);

impl DeviceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors from orchestrator calls. None of them affect other devices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("device {0} is already defined")]
    DuplicateDevice(String),

    #[error("no device named {0}")]
    UnknownDevice(String),

    #[error("device {device} is not parsed (status {status})")]
    NotParsed { device: String, status: DeviceStatus },

    #[error("device {device} of kind {kind} does not stack on a link")]
    NotStacked { device: String, kind: &'static str },

    #[error("device {device} is no longer waiting for a link (status {status})")]
    NotWaiting { device: String, status: DeviceStatus },
}

/// A device to stack on a link, as declared by the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackBinding {
    pub device: String,
    pub link: String,
}

impl StackBinding {
    pub fn new(device: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            link: link.into(),
        }
    }
}

/// Status report published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    StatusChanged {
        id: DeviceId,
        device: String,
        status: DeviceStatus,
        reason: Option<String>,
    },
    Removed {
        id: DeviceId,
        device: String,
    },
}

/// What a kernel reply did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply matched a pending request and settled the device.
    Applied { id: DeviceId, status: DeviceStatus },
    /// No pending request carried this sequence number.
    Discarded,
}

/// Point-in-time view of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub kind: &'static str,
    pub status: DeviceStatus,
    pub underlying_link: Option<String>,
    pub ifindex: Option<u32>,
    pub reason: Option<String>,
    pub file: PathBuf,
}

#[derive(Debug)]
struct Device {
    config: NetDevConfig,
    /// Why the device failed, if it did.
    reason: Option<String>,
}

/// Drives device creation against a kernel transport.
///
/// Single-threaded: the daemon loop owns it and feeds it replies and link
/// notifications one at a time.
pub struct Orchestrator {
    registry: Arc<KindRegistry>,
    kernel: Arc<dyn KernelTransport>,
    links: Arc<dyn LinkRegistry>,
    ctx: VerifyContext,
    capacity: usize,

    devices: BTreeMap<DeviceId, Device>,
    names: HashMap<String, DeviceId>,
    /// Sequence number -> device awaiting that reply.
    pending: HashMap<u32, DeviceId>,
    resolver: DependencyResolver,

    next_id: u64,
    next_seq: u32,
    subscribers: Vec<mpsc::UnboundedSender<DeviceEvent>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<KindRegistry>,
        kernel: Arc<dyn KernelTransport>,
        links: Arc<dyn LinkRegistry>,
        ctx: VerifyContext,
    ) -> Self {
        Self {
            registry,
            kernel,
            links,
            ctx,
            capacity: DEFAULT_CAPACITY,
            devices: BTreeMap::new(),
            names: HashMap::new(),
            pending: HashMap::new(),
            resolver: DependencyResolver::new(),
            next_id: 1,
            next_seq: 0,
            subscribers: Vec::new(),
        }
    }

    /// Limit the size of each create request.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Receive every status change from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Take ownership of a parsed device, verify it, and schedule creation.
    ///
    /// A device that fails verification is kept as `Failed` and never sent
    /// to the kernel.
    pub fn admit(&mut self, mut config: NetDevConfig) -> Result<DeviceId, OrchestratorError> {
        if self.names.contains_key(&config.name) {
            warn!(
                device = %config.name,
                file = %config.source.display(),
                "Device already defined, ignoring"
            );
            return Err(OrchestratorError::DuplicateDevice(config.name));
        }
        if config.status() != DeviceStatus::Parsed {
            return Err(OrchestratorError::NotParsed {
                status: config.status(),
                device: config.name,
            });
        }

        let id = DeviceId(self.next_id);
        self.next_id += 1;

        let verified = Validator::new(&self.registry).verify(&mut config, &self.ctx);
        let name = config.name.clone();

        debug!(%id, device = %name, kind = config.kind_name(), "Admitted device");
        self.names.insert(name.clone(), id);
        self.devices.insert(
            id,
            Device {
                config,
                reason: None,
            },
        );

        match verified {
            Ok(()) => self.schedule(id),
            Err(e) => {
                let reason = e.to_string();
                if let Some(device) = self.devices.get_mut(&id) {
                    device.reason = Some(reason.clone());
                }
                self.publish(DeviceEvent::StatusChanged {
                    id,
                    device: name,
                    status: DeviceStatus::Failed,
                    reason: Some(reason),
                });
            }
        }

        Ok(id)
    }

    /// Declare the link a waiting device stacks on.
    pub fn bind_underlying(&mut self, device: &str, link: &str) -> Result<(), OrchestratorError> {
        let id = *self
            .names
            .get(device)
            .ok_or_else(|| OrchestratorError::UnknownDevice(device.to_string()))?;
        let entry = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::UnknownDevice(device.to_string()))?;

        if entry.config.kind().dependency_class() == DependencyClass::Independent {
            return Err(OrchestratorError::NotStacked {
                device: device.to_string(),
                kind: entry.config.kind_name(),
            });
        }
        let status = entry.config.status();
        if status != DeviceStatus::WaitingOnDependency {
            return Err(OrchestratorError::NotWaiting {
                device: device.to_string(),
                status,
            });
        }

        entry.config.underlying_link = Some(UnderlyingLink::unresolved(link));
        debug!(device, link, "Bound underlying link");

        self.schedule(id);
        Ok(())
    }

    /// Drop every device and admit `configs` from scratch.
    ///
    /// Pending requests of the old devices are invalidated. Devices already
    /// created in the kernel are left alone. Returns the number admitted.
    pub fn reload(&mut self, configs: Vec<NetDevConfig>, bindings: &[StackBinding]) -> usize {
        let names: Vec<String> = self.names.keys().cloned().collect();
        for name in names {
            self.remove(&name);
        }

        let mut admitted = 0;
        for config in configs {
            match self.admit(config) {
                Ok(_) => admitted += 1,
                Err(e) => warn!(error = %e, "Skipping device"),
            }
        }

        for binding in bindings {
            if let Err(e) = self.bind_underlying(&binding.device, &binding.link) {
                warn!(
                    device = %binding.device,
                    link = %binding.link,
                    error = %e,
                    "Ignoring stacking binding"
                );
            }
        }

        info!(
            devices = admitted,
            in_flight = self.pending.len(),
            waiting_links = self.resolver.links().count(),
            "Loaded device configuration"
        );
        admitted
    }

    /// Forget a device. Returns false if it was not known.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(id) = self.names.remove(name) else {
            return false;
        };

        self.devices.remove(&id);
        let before = self.pending.len();
        self.pending.retain(|_, pending| *pending != id);
        self.resolver.cancel(id);

        info!(
            %id,
            device = name,
            invalidated = before - self.pending.len(),
            "Removed device"
        );
        self.publish(DeviceEvent::Removed {
            id,
            device: name.to_string(),
        });
        true
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Re-check every device waiting on `link`. Returns how many started.
    pub fn on_link_changed(&mut self, link: &str) -> usize {
        let waiters = self.resolver.waiters(link);
        if waiters.is_empty() {
            return 0;
        }

        let link_info = self.links.resolve(link);
        let mut started = 0;

        for id in waiters {
            let Some(device) = self.devices.get_mut(&id) else {
                self.resolver.cancel(id);
                continue;
            };
            if !is_satisfied(device.config.kind().dependency_class(), link_info) {
                continue;
            }

            if let Some(underlying) = device.config.underlying_link.as_mut() {
                underlying.ifindex = link_info.map(|l| l.ifindex);
            }
            info!(
                device = %device.config.name,
                link,
                ifindex = ?link_info.map(|l| l.ifindex),
                "Underlying link available"
            );

            self.resolver.cancel(id);
            self.start_creating(id);
            started += 1;
        }

        started
    }

    /// Apply a kernel reply to the device that sent the request.
    pub fn handle_reply(&mut self, reply: Reply) -> ReplyOutcome {
        let seq = reply.sequence;
        let Some(id) = self.pending.remove(&seq) else {
            debug!(seq, "Discarding reply with no pending request");
            return ReplyOutcome::Discarded;
        };
        let Some(device) = self.devices.get(&id) else {
            debug!(seq, %id, "Discarding reply for removed device");
            return ReplyOutcome::Discarded;
        };
        let name = device.config.name.clone();

        match reply.status {
            ReplyStatus::Ack => {
                info!(device = %name, seq, "Created device");
                self.transition(id, DeviceStatus::Ready, None);
            }
            ReplyStatus::Error(errno) if errno == Errno::EEXIST => {
                info!(device = %name, seq, "Device already exists, using existing");
                self.transition(id, DeviceStatus::Ready, None);
            }
            ReplyStatus::Error(errno) => {
                warn!(
                    device = %name,
                    seq,
                    errno = errno.code(),
                    error = %errno,
                    "Kernel rejected device"
                );
                self.fail(id, format!("kernel rejected device: {errno}"));
            }
        }

        let status = self
            .devices
            .get(&id)
            .map(|d| d.config.status())
            .unwrap_or(DeviceStatus::Failed);
        ReplyOutcome::Applied { id, status }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn status(&self, name: &str) -> Option<DeviceStatus> {
        self.config(name).map(NetDevConfig::status)
    }

    pub fn config(&self, name: &str) -> Option<&NetDevConfig> {
        let id = self.names.get(name)?;
        self.devices.get(id).map(|d| &d.config)
    }

    /// Why a device failed, if it did.
    pub fn failure_reason(&self, name: &str) -> Option<&str> {
        let id = self.names.get(name)?;
        self.devices.get(id).and_then(|d| d.reason.as_deref())
    }

    /// Number of requests awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// True when no request awaits a reply.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Links that waiting devices reference.
    pub fn waiting_links(&self) -> Vec<String> {
        self.resolver.links().map(str::to_string).collect()
    }

    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.devices
            .iter()
            .map(|(id, device)| DeviceSnapshot {
                id: *id,
                name: device.config.name.clone(),
                kind: device.config.kind_name(),
                status: device.config.status(),
                underlying_link: device
                    .config
                    .underlying_link
                    .as_ref()
                    .map(|l| l.name.clone()),
                ifindex: device.config.underlying_ifindex(),
                reason: device.reason.clone(),
                file: device.config.source.clone(),
            })
            .collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Start creation now or park the device until its link resolves.
    fn schedule(&mut self, id: DeviceId) {
        let Some(device) = self.devices.get_mut(&id) else {
            return;
        };

        let class = device.config.kind().dependency_class();
        if class == DependencyClass::Independent {
            self.start_creating(id);
            return;
        }

        let Some(link) = device.config.underlying_link.as_ref().map(|l| l.name.clone()) else {
            debug!(device = %device.config.name, "Waiting for an underlying link binding");
            self.transition(id, DeviceStatus::WaitingOnDependency, None);
            return;
        };

        let link_info = self.links.resolve(&link);
        if is_satisfied(class, link_info) {
            if let Some(underlying) = device.config.underlying_link.as_mut() {
                underlying.ifindex = link_info.map(|l| l.ifindex);
            }
            self.resolver.cancel(id);
            self.start_creating(id);
        } else {
            debug!(device = %device.config.name, link = %link, "Waiting for underlying link");
            self.resolver.wait(id, &link);
            self.transition(id, DeviceStatus::WaitingOnDependency, None);
        }
    }

    /// Encode and submit the create request.
    fn start_creating(&mut self, id: DeviceId) {
        if !self.transition(id, DeviceStatus::Creating, None) {
            return;
        }
        let Some(device) = self.devices.get(&id) else {
            return;
        };
        let name = device.config.name.clone();

        let mut request = match build_create_request(&device.config, self.capacity) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    device = %name,
                    kind = device.config.kind_name(),
                    key = e.failing_key(),
                    error = %e,
                    "Could not build create request"
                );
                self.fail(id, e.to_string());
                return;
            }
        };

        let seq = self.next_sequence();
        request.set_sequence(seq);

        match self.kernel.submit(&request) {
            Ok(()) => {
                self.pending.insert(seq, id);
                debug!(device = %name, seq, len = request.len(), "Submitted create request");
            }
            Err(e) => {
                warn!(device = %name, seq, error = %e, "Could not send create request");
                self.fail(id, format!("send failed: {e}"));
            }
        }
    }

    /// Next sequence number not currently pending. Zero is never used.
    fn next_sequence(&mut self) -> u32 {
        loop {
            self.next_seq = self.next_seq.wrapping_add(1);
            if self.next_seq != 0 && !self.pending.contains_key(&self.next_seq) {
                return self.next_seq;
            }
        }
    }

    fn fail(&mut self, id: DeviceId, reason: String) {
        self.transition(id, DeviceStatus::Failed, Some(reason));
    }

    /// Apply a lifecycle step. Refused steps are logged and leave the
    /// device unchanged. Moving to the current status is a no-op.
    fn transition(&mut self, id: DeviceId, next: DeviceStatus, reason: Option<String>) -> bool {
        let Some(device) = self.devices.get_mut(&id) else {
            return false;
        };
        let current = device.config.status();
        if current == next {
            return true;
        }

        if let Err(e) = device.config.advance(next) {
            warn!(device = %device.config.name, error = %e, "Refusing status transition");
            return false;
        }
        if reason.is_some() {
            device.reason = reason.clone();
        }

        debug!(
            device = %device.config.name,
            from = %current,
            to = %next,
            "Device status changed"
        );
        let event = DeviceEvent::StatusChanged {
            id,
            device: device.config.name.clone(),
            status: next,
            reason,
        };
        self.publish(event);
        true
    }

    fn publish(&mut self, event: DeviceEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("devices", &self.devices.len())
            .field("pending", &self.pending.len())
            .field("resolver", &self.resolver)
            .finish()
    }
}
