//! In-memory registry of live operations, keyed by identifier.

use std::sync::Arc;

use dashmap::DashMap;

use crate::operation::Operation;

/// Error returned by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The operation finished (and was removed) or never existed.
    #[error("Operation '{0}' does not exist")]
    NotFound(String),
}

/// Owner of every live operation.
///
/// Operations are registered at creation and removed the moment they reach
/// a final state, so a lookup succeeding implies the operation has not
/// finished yet (modulo the instant between the final broadcast and the
/// removal).
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: DashMap<String, Arc<Operation>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    /// Registers a freshly created operation; called by
    /// [`Operation::spawn`].
    pub(crate) fn add(&self, op: Arc<Operation>) {
        self.operations.insert(op.id().to_string(), op);
    }

    /// Looks up a live operation.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for finished or unknown identifiers.
    pub fn get(&self, id: &str) -> Result<Arc<Operation>, RegistryError> {
        self.operations
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Removes an operation; called by the operation itself on completion.
    pub(crate) fn remove(&self, id: &str) {
        self.operations.remove(id);
    }

    /// Snapshot of every live operation.
    #[must_use]
    pub fn operations(&self) -> Vec<Arc<Operation>> {
        self.operations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of live operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when no operations are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
