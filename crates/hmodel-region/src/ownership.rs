//! Field ownership records shared between a master region and its groups.

use std::cell::RefCell;
use std::rc::Rc;

use hmodel_core::ListenerId;
use hmodel_fields::{FieldManager, FieldManagerMessage, SharedDomain};

use crate::id::RegionId;

/// How [`RegionTree::attach_fields`](crate::RegionTree::attach_fields) sources
/// a region's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachVariant {
    /// New field manager and domain, independent of any master.
    Own,
    /// New field manager and domain reusing the master's shape registry.
    ShareBases,
    /// The master's field ownership plus a restricted domain view.
    ShareGroup,
}

pub type SharedFields = Rc<RefCell<FieldOwnership>>;

/// Field manager and master domain, held by one owning region and shared
/// with any number of group regions.
#[derive(Debug)]
pub struct FieldOwnership {
    owning_region: Option<RegionId>,
    manager: FieldManager,
    domain: SharedDomain,
    forward_listener: Option<ListenerId>,
    outbox: Rc<RefCell<Vec<FieldManagerMessage>>>,
}

impl FieldOwnership {
    /// Wrap `manager` and register the listener that queues messages to be
    /// forwarded to the parent region's fields.
    pub(crate) fn new(owner: RegionId, mut manager: FieldManager, domain: SharedDomain) -> Self {
        let outbox: Rc<RefCell<Vec<FieldManagerMessage>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&outbox);
        let forward_listener = manager.register_listener(move |message| {
            if message.summary().forwards_to_parent() {
                sink.borrow_mut().push(message.clone());
            }
        });
        Self {
            owning_region: Some(owner),
            manager,
            domain,
            forward_listener: Some(forward_listener),
            outbox,
        }
    }

    /// Region owning these fields; cleared once the owner is torn down.
    #[must_use]
    pub fn owning_region(&self) -> Option<RegionId> {
        self.owning_region
    }

    #[must_use]
    pub fn manager(&self) -> &FieldManager {
        &self.manager
    }

    /// Edits go through [`RegionTree::edit_fields`](crate::RegionTree::edit_fields)
    /// so that queued messages are forwarded when the region's bracket closes.
    pub(crate) fn manager_mut(&mut self) -> &mut FieldManager {
        &mut self.manager
    }

    /// Master domain container (groups see a restricted view of it).
    #[must_use]
    pub fn domain(&self) -> &SharedDomain {
        &self.domain
    }

    #[must_use]
    pub fn is_forwarding(&self) -> bool {
        self.forward_listener.is_some()
    }

    pub(crate) fn take_forwarded(&self) -> Vec<FieldManagerMessage> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    /// Stop forwarding and drop the owner back-reference.
    pub(crate) fn release_owner(&mut self) {
        if let Some(listener) = self.forward_listener.take()
            && let Err(err) = self.manager.deregister_listener(listener)
        {
            tracing::error!(error = %err, "forwarding listener already gone");
        }
        self.outbox.borrow_mut().clear();
        self.owning_region = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmodel_fields::{DomainContainer, FieldDefinition, ShapeRegistry};

    fn ownership() -> FieldOwnership {
        let bases = Rc::new(RefCell::new(ShapeRegistry::new()));
        let domain = Rc::new(RefCell::new(DomainContainer::new_master(bases)));
        let owner = RegionId {
            index: 0,
            generation: 0,
        };
        FieldOwnership::new(owner, FieldManager::new(), domain)
    }

    #[test]
    fn only_forwarded_categories_are_queued() {
        let mut fields = ownership();
        fields
            .manager_mut()
            .define_field(FieldDefinition::real("a"))
            .unwrap();
        fields.manager_mut().rename_field("a", "b").unwrap();
        let queued = fields.take_forwarded();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].summary().forwards_to_parent());
        assert!(fields.take_forwarded().is_empty());
    }

    #[test]
    fn release_stops_forwarding() {
        let mut fields = ownership();
        assert_eq!(fields.manager().listener_count(), 1);
        fields.release_owner();
        assert!(!fields.is_forwarding());
        assert_eq!(fields.owning_region(), None);
        assert_eq!(fields.manager().listener_count(), 0);
        fields
            .manager_mut()
            .define_field(FieldDefinition::real("c"))
            .unwrap();
        assert!(fields.take_forwarded().is_empty());
    }
}
