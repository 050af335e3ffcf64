//! Error types for device definitions.

use std::path::PathBuf;

use netdevd_rtnl::EncodeError;
use thiserror::Error;

use crate::config::DeviceStatus;

/// Registry misuse. Fatal at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A kind with this name is already registered.
    #[error("device kind already registered: {0}")]
    DuplicateKind(String),

    /// No kind with this name is registered.
    #[error("device kind not found: {0}")]
    NotFound(String),
}

/// Per-kind configuration accessed through the wrong variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{actual} configuration accessed as {requested}")]
pub struct KindMismatch {
    pub actual: &'static str,
    pub requested: &'static str,
}

/// Semantic rejection from the verification pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Overlay id missing or above the protocol maximum.
    #[error("{kind} without valid Id configured in {}", .file.display())]
    InvalidId { kind: &'static str, file: PathBuf },

    /// A `[Match]` condition does not hold on this host.
    #[error("condition {condition} not met in {}", .file.display())]
    ConditionNotMet { condition: String, file: PathBuf },

    #[error(transparent)]
    KindMismatch(#[from] KindMismatch),
}

/// A device file that could not produce a device at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("{}: missing [NetDev] Name=", .file.display())]
    MissingName { file: PathBuf },

    #[error("{}: missing [NetDev] Kind=", .file.display())]
    MissingKind { file: PathBuf },

    #[error("{}: unknown device kind {kind}", .file.display())]
    UnknownKind { file: PathBuf, kind: String },
}

/// Failure to turn a configuration into a create request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A stacked kind was encoded without its underlying link.
    #[error("{device}: underlying link not resolved")]
    MissingLink { device: String },

    #[error(transparent)]
    KindMismatch(#[from] KindMismatch),
}

impl BuildError {
    /// Name of the attribute that failed, when the builder rejected one.
    pub fn failing_key(&self) -> Option<&'static str> {
        match self {
            Self::Encode(e) => Some(e.key()),
            _ => None,
        }
    }
}

/// A status change the lifecycle does not allow.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid status transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: DeviceStatus,
    pub to: DeviceStatus,
}
