//! Kind descriptor registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::RegistryError;
use crate::kind::NetDevKind;
use crate::kinds::{Dummy, Vxlan};

/// Device kinds by name.
///
/// Filled at startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<&'static str, Arc<dyn NetDevKind>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in kind.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(Vxlan))?;
        registry.register(Arc::new(Dummy))?;
        Ok(registry)
    }

    pub fn register(&mut self, kind: Arc<dyn NetDevKind>) -> Result<(), RegistryError> {
        let name = kind.kind_name();
        if self.kinds.contains_key(name) {
            return Err(RegistryError::DuplicateKind(name.to_string()));
        }

        debug!(kind = name, class = ?kind.dependency_class(), "Registered device kind");
        self.kinds.insert(name, kind);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn NetDevKind>, RegistryError> {
        self.kinds
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered kind names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
