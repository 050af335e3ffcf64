//! # netdevd-netdev
//!
//! Virtual network device definitions: what a device kind is, how its
//! configuration is parsed and verified, and how it becomes a kernel
//! create-link request.
//!
//! ## Design Principles
//!
//! - Kinds are trait objects held by an explicit [`KindRegistry`]; there is
//!   no process-wide table
//! - Per-kind fields live in the closed [`KindConfig`] enum and are reached
//!   through accessors that fail with [`KindMismatch`] instead of casting
//! - A bad configuration line is reported and skipped ([`Assignment::Rejected`]);
//!   it never aborts the rest of the file
//! - A failed verification marks only that device failed
//!
//! ## Flow
//!
//! ```text
//! ConfigEntry tuples -> Validator::load -> NetDevConfig (Parsed)
//!                    -> Validator::verify -> build_create_request -> Request
//! ```

mod config;
mod encode;
mod error;
mod field;
mod kind;
pub mod kinds;
mod registry;
mod validator;

pub use config::{
    AddressFamily, Condition, DeviceStatus, MacAddr, NetDevConfig, UnderlyingLink, VerifyContext,
};
pub use encode::build_create_request;
pub use error::{BuildError, KindMismatch, LoadError, RegistryError, TransitionError, VerifyError};
pub use field::{Assignment, ConfigEntry, Diagnostic, FieldError, FieldSpec, ParseFn};
pub use kind::{DependencyClass, KindConfig, NetDevKind};
pub use registry::KindRegistry;
pub use validator::{Loaded, Validator};
