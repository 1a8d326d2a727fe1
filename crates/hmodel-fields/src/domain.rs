//! Node and element containers.
//!
//! A master container owns node and element ids. A group container is a view
//! restricted to objects its master holds; removing an object from the master
//! hides it from every group view on the next query.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use hmodel_core::{ListenerId, ListenerList};

use crate::change::{DomainChange, DomainMessage};
use crate::error::FieldError;

/// Handle into a [`ShapeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// Registry of element shapes, shared by every container in a tree.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    names: Vec<String>,
    lookup: BTreeMap<String, ShapeId>,
}

impl ShapeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `name`, registering it on first use.
    pub fn find_or_create(&mut self, name: &str) -> ShapeId {
        if let Some(id) = self.lookup.get(name) {
            return *id;
        }
        let id = ShapeId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), id);
        id
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<ShapeId> {
        self.lookup.get(name).copied()
    }

    #[must_use]
    pub fn name(&self, id: ShapeId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub type SharedBases = Rc<RefCell<ShapeRegistry>>;
pub type SharedDomain = Rc<RefCell<DomainContainer>>;

enum Storage {
    Master {
        nodes: BTreeSet<u32>,
        elements: BTreeMap<u32, ShapeId>,
    },
    Group {
        master: SharedDomain,
        nodes: BTreeSet<u32>,
        elements: BTreeSet<u32>,
    },
}

/// Node and element sets with change caching.
pub struct DomainContainer {
    bases: SharedBases,
    storage: Storage,
    cache_level: u32,
    pending: DomainMessage,
    listeners: ListenerList<DomainMessage>,
}

impl fmt::Debug for DomainContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainContainer")
            .field("group", &self.is_group())
            .field("nodes", &self.node_ids())
            .field("elements", &self.element_ids())
            .field("cache_level", &self.cache_level)
            .finish()
    }
}

impl DomainContainer {
    /// Create a master container using `bases` for element shapes.
    #[must_use]
    pub fn new_master(bases: SharedBases) -> Self {
        Self::with_storage(
            bases,
            Storage::Master {
                nodes: BTreeSet::new(),
                elements: BTreeMap::new(),
            },
        )
    }

    /// Create a group view over `master`.
    pub fn new_group(master: &SharedDomain) -> Result<Self, FieldError> {
        let bases = {
            let borrowed = master.borrow();
            if borrowed.is_group() {
                return Err(FieldError::InvalidMaster);
            }
            Rc::clone(&borrowed.bases)
        };
        Ok(Self::with_storage(
            bases,
            Storage::Group {
                master: Rc::clone(master),
                nodes: BTreeSet::new(),
                elements: BTreeSet::new(),
            },
        ))
    }

    fn with_storage(bases: SharedBases, storage: Storage) -> Self {
        Self {
            bases,
            storage,
            cache_level: 0,
            pending: DomainMessage::default(),
            listeners: ListenerList::default(),
        }
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.storage, Storage::Group { .. })
    }

    /// Master of a group view, `None` for a master.
    #[must_use]
    pub fn master(&self) -> Option<&SharedDomain> {
        match &self.storage {
            Storage::Master { .. } => None,
            Storage::Group { master, .. } => Some(master),
        }
    }

    #[must_use]
    pub fn shared_bases(&self) -> &SharedBases {
        &self.bases
    }

    pub fn add_node(&mut self, id: u32) -> Result<(), FieldError> {
        match &mut self.storage {
            Storage::Master { nodes, .. } => {
                if !nodes.insert(id) {
                    return Err(FieldError::DuplicateNode { id });
                }
            }
            Storage::Group { master, nodes, .. } => {
                if !master.borrow().contains_node(id) {
                    return Err(FieldError::NotInMaster { kind: "node", id });
                }
                if !nodes.insert(id) {
                    return Err(FieldError::DuplicateNode { id });
                }
            }
        }
        self.record_node(id, DomainChange::NODE_ADDED);
        Ok(())
    }

    pub fn remove_node(&mut self, id: u32) -> Result<(), FieldError> {
        let removed = match &mut self.storage {
            Storage::Master { nodes, .. } | Storage::Group { nodes, .. } => nodes.remove(&id),
        };
        if !removed {
            return Err(FieldError::UnknownNode { id });
        }
        self.record_node(id, DomainChange::NODE_REMOVED);
        Ok(())
    }

    #[must_use]
    pub fn contains_node(&self, id: u32) -> bool {
        match &self.storage {
            Storage::Master { nodes, .. } => nodes.contains(&id),
            Storage::Group { master, nodes, .. } => {
                nodes.contains(&id) && master.borrow().contains_node(id)
            }
        }
    }

    /// Add an element. A master requires the element's shape name; a group
    /// takes the shape from its master and ignores `shape`.
    pub fn add_element(&mut self, id: u32, shape: &str) -> Result<(), FieldError> {
        match &mut self.storage {
            Storage::Master { elements, .. } => {
                if elements.contains_key(&id) {
                    return Err(FieldError::DuplicateElement { id });
                }
                let shape_id = self.bases.borrow_mut().find_or_create(shape);
                elements.insert(id, shape_id);
            }
            Storage::Group {
                master, elements, ..
            } => {
                if !master.borrow().contains_element(id) {
                    return Err(FieldError::NotInMaster {
                        kind: "element",
                        id,
                    });
                }
                if !elements.insert(id) {
                    return Err(FieldError::DuplicateElement { id });
                }
            }
        }
        self.record_element(id, DomainChange::ELEMENT_ADDED);
        Ok(())
    }

    pub fn remove_element(&mut self, id: u32) -> Result<(), FieldError> {
        let removed = match &mut self.storage {
            Storage::Master { elements, .. } => elements.remove(&id).is_some(),
            Storage::Group { elements, .. } => elements.remove(&id),
        };
        if !removed {
            return Err(FieldError::UnknownElement { id });
        }
        self.record_element(id, DomainChange::ELEMENT_REMOVED);
        Ok(())
    }

    #[must_use]
    pub fn contains_element(&self, id: u32) -> bool {
        match &self.storage {
            Storage::Master { elements, .. } => elements.contains_key(&id),
            Storage::Group {
                master, elements, ..
            } => elements.contains(&id) && master.borrow().contains_element(id),
        }
    }

    /// Node ids in ascending order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<u32> {
        match &self.storage {
            Storage::Master { nodes, .. } => nodes.iter().copied().collect(),
            Storage::Group { master, nodes, .. } => {
                let master = master.borrow();
                nodes
                    .iter()
                    .copied()
                    .filter(|id| master.contains_node(*id))
                    .collect()
            }
        }
    }

    /// Element ids in ascending order.
    #[must_use]
    pub fn element_ids(&self) -> Vec<u32> {
        match &self.storage {
            Storage::Master { elements, .. } => elements.keys().copied().collect(),
            Storage::Group {
                master, elements, ..
            } => {
                let master = master.borrow();
                elements
                    .iter()
                    .copied()
                    .filter(|id| master.contains_element(*id))
                    .collect()
            }
        }
    }

    /// Shape name of element `id`, looked up through the master for groups.
    #[must_use]
    pub fn element_shape(&self, id: u32) -> Option<String> {
        match &self.storage {
            Storage::Master { elements, .. } => {
                let shape = elements.get(&id)?;
                self.bases.borrow().name(*shape).map(str::to_string)
            }
            Storage::Group {
                master, elements, ..
            } => {
                if !elements.contains(&id) {
                    return None;
                }
                master.borrow().element_shape(id)
            }
        }
    }

    pub fn begin_change(&mut self) {
        self.cache_level += 1;
    }

    /// Close one cache level; the outermost close delivers pending changes.
    pub fn end_change(&mut self) -> Result<Option<DomainMessage>, FieldError> {
        if self.cache_level == 0 {
            return Err(FieldError::UnbalancedEndChange {
                resource: "domain container",
            });
        }
        self.cache_level -= 1;
        if self.cache_level == 0 {
            return Ok(self.flush());
        }
        Ok(None)
    }

    #[must_use]
    pub const fn cache_level(&self) -> u32 {
        self.cache_level
    }

    pub fn register_listener(&mut self, listener: impl FnMut(&DomainMessage) + 'static) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn deregister_listener(&mut self, id: ListenerId) -> Result<(), FieldError> {
        if self.listeners.deregister(id) {
            Ok(())
        } else {
            Err(FieldError::UnknownListener { id })
        }
    }

    fn record_node(&mut self, id: u32, change: DomainChange) {
        self.pending.summary |= change;
        self.pending.nodes.insert(id);
        if self.cache_level == 0 {
            self.flush();
        }
    }

    fn record_element(&mut self, id: u32, change: DomainChange) {
        self.pending.summary |= change;
        self.pending.elements.insert(id);
        if self.cache_level == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) -> Option<DomainMessage> {
        if self.pending.is_empty() {
            return None;
        }
        let message = std::mem::take(&mut self.pending);
        self.listeners.notify(&message);
        Some(message)
    }
}
