//! Region change records and callback registration.

use std::fmt;

use crate::id::RegionId;
use crate::tree::RegionTree;

/// Structural change to a region's children during one cache window.
///
/// At most one specific child is remembered. A second children change in the
/// same window collapses the record to [`ChildChange::Multiple`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChildChange {
    #[default]
    None,
    Added(RegionId),
    /// The removed child and the name it had under this parent.
    Removed {
        region: RegionId,
        name: Option<String>,
    },
    Multiple,
}

impl ChildChange {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn collapse(&mut self, next: ChildChange) {
        *self = if self.is_none() {
            next
        } else {
            Self::Multiple
        };
    }
}

/// Snapshot delivered to callbacks when a region's change cache is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionChanges {
    pub region: RegionId,
    pub name_changed: bool,
    pub children: ChildChange,
    pub objects_changed: bool,
}

impl RegionChanges {
    #[must_use]
    pub fn children_changed(&self) -> bool {
        !self.children.is_none()
    }

    /// Child added, when exactly one child was added and nothing else
    /// happened to the children.
    #[must_use]
    pub fn child_added(&self) -> Option<RegionId> {
        match self.children {
            ChildChange::Added(region) => Some(region),
            _ => None,
        }
    }

    #[must_use]
    pub fn child_removed(&self) -> Option<RegionId> {
        match self.children {
            ChildChange::Removed { region, .. } => Some(region),
            _ => None,
        }
    }
}

/// Changes recorded inside the current cache window.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingChanges {
    name_changed: bool,
    children: ChildChange,
    objects_changed: bool,
}

impl PendingChanges {
    pub(crate) fn name_changed(&mut self) {
        self.name_changed = true;
    }

    pub(crate) fn objects_changed(&mut self) {
        self.objects_changed = true;
    }

    pub(crate) fn child_added(&mut self, child: RegionId) {
        self.children.collapse(ChildChange::Added(child));
    }

    pub(crate) fn child_removed(&mut self, child: RegionId, name: Option<String>) {
        self.children.collapse(ChildChange::Removed {
            region: child,
            name,
        });
    }

    /// Record an unspecific children change, such as a reorder.
    pub(crate) fn children_changed(&mut self) {
        self.children = ChildChange::Multiple;
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.name_changed && self.children.is_none() && !self.objects_changed
    }

    /// Move the pending record out, leaving nothing pending.
    pub(crate) fn take(&mut self, region: RegionId) -> RegionChanges {
        let pending = std::mem::take(self);
        RegionChanges {
            region,
            name_changed: pending.name_changed,
            children: pending.children,
            objects_changed: pending.objects_changed,
        }
    }
}

/// Handle returned by [`RegionTree::add_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

/// Region change callback. It receives the tree so it may query or mutate it.
pub type RegionCallback = Box<dyn FnMut(&mut RegionTree, &RegionChanges)>;

/// Per-region callback list.
///
/// A callback is taken out of its slot while it runs, so the tree can be
/// lent to it mutably. Slots emptied that way are refilled afterwards unless
/// the callback was removed in the meantime.
#[derive(Default)]
pub(crate) struct ChangeNotifier {
    next_id: u64,
    entries: Vec<(CallbackId, Option<RegionCallback>)>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, _)| id.0))
            .finish()
    }
}

impl ChangeNotifier {
    pub(crate) fn add(&mut self, callback: RegionCallback) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.entries.push((id, Some(callback)));
        id
    }

    pub(crate) fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Ids in registration order.
    pub(crate) fn ids(&self) -> Vec<CallbackId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub(crate) fn take(&mut self, id: CallbackId) -> Option<RegionCallback> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| *entry == id)
            .and_then(|(_, callback)| callback.take())
    }

    pub(crate) fn restore(&mut self, id: CallbackId, callback: RegionCallback) {
        if let Some((_, slot)) = self.entries.iter_mut().find(|(entry, _)| *entry == id) {
            *slot = Some(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> RegionId {
        RegionId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn second_children_change_collapses() {
        let mut pending = PendingChanges::default();
        pending.child_added(id(1));
        assert_eq!(pending.children, ChildChange::Added(id(1)));
        pending.child_removed(id(2), Some("b".to_string()));
        assert_eq!(pending.children, ChildChange::Multiple);
        pending.child_added(id(3));
        assert_eq!(pending.children, ChildChange::Multiple);
    }

    #[test]
    fn take_clears_pending() {
        let mut pending = PendingChanges::default();
        pending.name_changed();
        pending.child_removed(id(4), Some("gone".to_string()));
        let changes = pending.take(id(0));
        assert!(changes.name_changed);
        assert_eq!(changes.child_removed(), Some(id(4)));
        assert!(pending.is_empty());
    }

    #[test]
    fn taken_callback_is_not_restored_after_removal() {
        let mut notifier = ChangeNotifier::default();
        let first = notifier.add(Box::new(|_, _| {}));
        let second = notifier.add(Box::new(|_, _| {}));
        assert_eq!(notifier.ids(), vec![first, second]);
        let callback = notifier.take(first).expect("registered");
        assert!(notifier.take(first).is_none());
        assert!(notifier.remove(first));
        notifier.restore(first, callback);
        assert_eq!(notifier.ids(), vec![second]);
        assert_eq!(notifier.len(), 1);
    }
}
