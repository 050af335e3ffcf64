//! netdevd
//!
//! Creates virtual network devices from declarative `.netdev` files.
//!
//! ## Architecture
//!
//! - **Source**: reads the configuration directory into `(section, key, value)` entries
//! - **Validator** (netdevd-netdev): turns entries into verified device configurations
//! - **Orchestrator**: sequences creation, waits on underlying links, tracks replies
//! - **Kernel transport**: rtnetlink socket, or an in-process stand-in
//! - **Daemon**: the event loop tying replies, link polling, and reloads together

pub mod config;
pub mod daemon;
pub mod kernel;
pub mod links;
pub mod logging;
pub mod orchestrator;
pub mod resolver;
pub mod source;

pub use config::{Config, LogFormat};
pub use daemon::Daemon;
pub use kernel::{DryRunKernel, KernelTransport, MockKernel, TransportError};
pub use links::{HostLinks, LinkInfo, LinkRegistry, StaticLinks};
pub use orchestrator::{
    DeviceEvent, DeviceId, DeviceSnapshot, Orchestrator, OrchestratorError, ReplyOutcome,
    StackBinding,
};
pub use resolver::DependencyResolver;
