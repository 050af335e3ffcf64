//! Dummy devices: no kind data, no dependencies.

use netdevd_rtnl::MessageBuilder;

use crate::config::{NetDevConfig, VerifyContext};
use crate::error::{BuildError, VerifyError};
use crate::field::FieldSpec;
use crate::kind::{DependencyClass, KindConfig, NetDevKind};

const SECTIONS: &[&str] = &["Match", "NetDev"];

/// The `dummy` kind.
#[derive(Debug, Default)]
pub struct Dummy;

impl NetDevKind for Dummy {
    fn kind_name(&self) -> &'static str {
        "dummy"
    }

    fn sections(&self) -> &'static [&'static str] {
        SECTIONS
    }

    fn schema(&self) -> &'static [FieldSpec] {
        &[]
    }

    fn dependency_class(&self) -> DependencyClass {
        DependencyClass::Independent
    }

    fn default_init(&self) -> KindConfig {
        KindConfig::Dummy
    }

    fn verify(&self, _config: &NetDevConfig, _ctx: &VerifyContext) -> Result<(), VerifyError> {
        Ok(())
    }

    fn has_kind_data(&self) -> bool {
        false
    }

    fn encode(
        &self,
        _config: &NetDevConfig,
        _link: Option<u32>,
        _builder: &mut MessageBuilder,
    ) -> Result<(), BuildError> {
        Ok(())
    }
}
