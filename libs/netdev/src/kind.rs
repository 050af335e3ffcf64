//! Device kind contract.

use std::fmt::Debug;

use netdevd_rtnl::MessageBuilder;
use serde::Serialize;

use crate::config::{NetDevConfig, VerifyContext};
use crate::error::{BuildError, KindMismatch, VerifyError};
use crate::field::FieldSpec;
use crate::kinds::vxlan::VxlanConfig;

/// What a kind needs before it can be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyClass {
    /// Created as soon as it is verified.
    Independent,
    /// Needs the underlying link to exist (have an interface index).
    StackedOnLink,
    /// Needs the underlying link to exist and carry an address.
    RequiresAddress,
}

/// Kind-specific configuration fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindConfig {
    Vxlan(VxlanConfig),
    Dummy,
}

impl KindConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Vxlan(_) => "vxlan",
            Self::Dummy => "dummy",
        }
    }

    pub fn as_vxlan(&self) -> Result<&VxlanConfig, KindMismatch> {
        match self {
            Self::Vxlan(v) => Ok(v),
            other => Err(other.mismatch("vxlan")),
        }
    }

    pub fn as_vxlan_mut(&mut self) -> Result<&mut VxlanConfig, KindMismatch> {
        match self {
            Self::Vxlan(v) => Ok(v),
            other => Err(other.mismatch("vxlan")),
        }
    }

    fn mismatch(&self, requested: &'static str) -> KindMismatch {
        KindMismatch {
            actual: self.kind_name(),
            requested,
        }
    }
}

/// Behavior shared by every configuration of one device kind.
///
/// One value per kind lives in the [`KindRegistry`](crate::KindRegistry)
/// for the life of the process.
pub trait NetDevKind: Debug + Send + Sync {
    /// Value of `[NetDev] Kind=` and `IFLA_INFO_KIND`.
    fn kind_name(&self) -> &'static str;

    /// Configuration sections this kind accepts.
    fn sections(&self) -> &'static [&'static str];

    /// Kind-specific fields and their parsers.
    fn schema(&self) -> &'static [FieldSpec];

    fn dependency_class(&self) -> DependencyClass;

    /// Kind-specific defaults for a fresh configuration.
    fn default_init(&self) -> KindConfig;

    /// Semantic check run once all fields are assigned.
    fn verify(&self, config: &NetDevConfig, ctx: &VerifyContext) -> Result<(), VerifyError>;

    /// Whether the kind writes an `IFLA_INFO_DATA` container.
    fn has_kind_data(&self) -> bool {
        true
    }

    /// Write kind attributes into the open `IFLA_INFO_DATA` container.
    fn encode(
        &self,
        config: &NetDevConfig,
        link: Option<u32>,
        builder: &mut MessageBuilder,
    ) -> Result<(), BuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_mismatch() {
        let mut config = KindConfig::Dummy;
        let err = config.as_vxlan_mut().unwrap_err();
        assert_eq!(err.actual, "dummy");
        assert_eq!(err.requested, "vxlan");
        assert_eq!(err.to_string(), "dummy configuration accessed as vxlan");
    }

    #[test]
    fn test_accessor_match() {
        let config = KindConfig::Vxlan(VxlanConfig::default());
        assert!(config.as_vxlan().unwrap().learning);
    }
}
