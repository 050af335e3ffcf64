//! Per-device configuration state and lifecycle status.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::TransitionError;
use crate::kind::{KindConfig, NetDevKind};

/// Lifecycle status of one configured device.
///
/// Moves forward only; any non-terminal state may fall to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Section seen, fields still being assigned.
    Unconfigured,
    /// All fields assigned.
    Parsed,
    /// Waiting for the underlying link.
    WaitingOnDependency,
    /// Create request outstanding.
    Creating,
    /// Kernel acknowledged creation.
    Ready,
    /// Verification, encoding, or the kernel rejected the device.
    Failed,
}

impl DeviceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;

        match (self, next) {
            (Ready | Failed, _) => false,
            (_, Failed) => true,
            (Unconfigured, Parsed) => true,
            (Parsed, WaitingOnDependency | Creating) => true,
            (WaitingOnDependency, Creating) => true,
            (Creating, Ready) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Parsed => "parsed",
            Self::WaitingOnDependency => "waiting_on_dependency",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family fixed by the first address-bearing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("ipv4"),
            Self::Inet6 => f.write_str("ipv6"),
        }
    }
}

/// Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = ();

    /// Six hex octets separated by `:` or `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0u8; 6];
        let mut parts = s.split(sep);

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(())?;
            if part.is_empty() || part.len() > 2 {
                return Err(());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }

        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// A `[Match]` condition, optionally negated with a leading `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Host { value: String, negate: bool },
    Architecture { value: String, negate: bool },
}

impl Condition {
    /// Evaluate against the host facts.
    pub fn holds(&self, ctx: &VerifyContext) -> bool {
        match self {
            Self::Host { value, negate } => ctx.hostname.eq_ignore_ascii_case(value) != *negate,
            Self::Architecture { value, negate } => (ctx.architecture == *value) != *negate,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (key, value, negate) = match self {
            Self::Host { value, negate } => ("Host", value, negate),
            Self::Architecture { value, negate } => ("Architecture", value, negate),
        };
        write!(f, "{}={}{}", key, if *negate { "!" } else { "" }, value)
    }
}

/// Host facts consulted by the verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyContext {
    pub hostname: String,
    /// Architecture in `x86-64`/`arm64` notation.
    pub architecture: String,
}

impl VerifyContext {
    pub fn new(hostname: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            architecture: architecture.into(),
        }
    }

    /// Read the running host's name and architecture.
    pub fn detect() -> Self {
        let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "localhost".to_string());

        Self::new(hostname, native_architecture())
    }
}

fn native_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86-64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loongarch64",
        other => other,
    }
}

/// Reference to the interface a stacked device sits on.
///
/// Held by name; the index is filled in once the link registry resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnderlyingLink {
    pub name: String,
    pub ifindex: Option<u32>,
}

impl UnderlyingLink {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ifindex: None,
        }
    }
}

/// Configuration of one device instance.
#[derive(Debug, Clone)]
pub struct NetDevConfig {
    kind: Arc<dyn NetDevKind>,
    status: DeviceStatus,

    /// Interface name, unique on the host.
    pub name: String,
    /// File the device was defined in.
    pub source: PathBuf,
    pub description: Option<String>,
    pub mtu: Option<u32>,
    pub mac: Option<MacAddr>,
    pub conditions: Vec<Condition>,
    /// Unset until the first address-bearing field is assigned.
    pub address_family: Option<AddressFamily>,
    pub kind_config: KindConfig,
    pub underlying_link: Option<UnderlyingLink>,
}

impl NetDevConfig {
    /// Create a configuration with the kind's defaults applied.
    pub fn new(kind: Arc<dyn NetDevKind>, name: impl Into<String>, source: &Path) -> Self {
        let kind_config = kind.default_init();
        Self {
            kind,
            status: DeviceStatus::Unconfigured,
            name: name.into(),
            source: source.to_path_buf(),
            description: None,
            mtu: None,
            mac: None,
            conditions: Vec::new(),
            address_family: None,
            kind_config,
            underlying_link: None,
        }
    }

    pub fn kind(&self) -> &Arc<dyn NetDevKind> {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn advance(&mut self, next: DeviceStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record that loading finished. Only moves a configuration that is still
    /// `Unconfigured`.
    pub(crate) fn mark_parsed(&mut self) {
        if self.status == DeviceStatus::Unconfigured {
            self.status = DeviceStatus::Parsed;
        }
    }

    /// Mark failed. No effect once terminal.
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = DeviceStatus::Failed;
        }
    }

    /// Resolved index of the underlying link, if any.
    pub fn underlying_ifindex(&self) -> Option<u32> {
        self.underlying_link.as_ref().and_then(|l| l.ifindex)
    }
}
