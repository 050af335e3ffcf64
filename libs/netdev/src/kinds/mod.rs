//! Built-in device kinds.

pub mod dummy;
pub mod vxlan;

pub use dummy::Dummy;
pub use vxlan::{Vxlan, VxlanConfig};
