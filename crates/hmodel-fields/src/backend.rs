//! Factory seam between regions and field storage.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::domain::{DomainContainer, ShapeRegistry, SharedBases, SharedDomain};
use crate::error::FieldError;
use crate::manager::FieldManager;

/// Creates the field-layer objects a region attaches.
pub trait FieldBackend {
    fn create_field_manager(&self) -> Result<FieldManager, FieldError>;

    /// Create a domain container.
    ///
    /// With `master` set, the result is a group view over it. Otherwise a
    /// master is created, reusing `shared_bases` when given.
    fn create_domain_container(
        &self,
        master: Option<&SharedDomain>,
        shared_bases: Option<&SharedBases>,
    ) -> Result<DomainContainer, FieldError>;
}

/// In-process backend. An optional manager limit simulates allocation
/// failure.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    manager_limit: Option<usize>,
    managers_created: Cell<usize>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every manager allocation after the first `limit`.
    #[must_use]
    pub fn with_manager_limit(limit: usize) -> Self {
        Self {
            manager_limit: Some(limit),
            managers_created: Cell::new(0),
        }
    }

    #[must_use]
    pub fn managers_created(&self) -> usize {
        self.managers_created.get()
    }
}

impl FieldBackend for MemoryBackend {
    fn create_field_manager(&self) -> Result<FieldManager, FieldError> {
        let created = self.managers_created.get();
        if self.manager_limit.is_some_and(|limit| created >= limit) {
            tracing::debug!(created, "field manager allocation refused");
            return Err(FieldError::AllocationFailed {
                resource: "field manager",
            });
        }
        self.managers_created.set(created + 1);
        Ok(FieldManager::new())
    }

    fn create_domain_container(
        &self,
        master: Option<&SharedDomain>,
        shared_bases: Option<&SharedBases>,
    ) -> Result<DomainContainer, FieldError> {
        match master {
            Some(master) => DomainContainer::new_group(master),
            None => {
                let bases = shared_bases
                    .map(Rc::clone)
                    .unwrap_or_else(|| Rc::new(RefCell::new(ShapeRegistry::new())));
                Ok(DomainContainer::new_master(bases))
            }
        }
    }
}
