//! Change categories and the messages delivered when a change cache is
//! released.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;

bitflags! {
    /// Categories of change to a field definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldChange: u8 {
        /// Field was defined.
        const ADD = 1 << 0;
        /// Field was removed.
        const REMOVE = 1 << 1;
        /// Field was renamed.
        const IDENTIFIER = 1 << 2;
        /// Field definition (type, component count) changed.
        const DEFINITION = 1 << 3;
        /// Field values changed.
        const RESULT = 1 << 4;
    }
}

impl FieldChange {
    /// Categories a child region forwards to its parent's field manager.
    pub const FORWARDED: Self = Self::RESULT.union(Self::ADD);

    /// True when a message with this summary is propagated upward.
    #[must_use]
    pub fn forwards_to_parent(self) -> bool {
        self.intersects(Self::FORWARDED)
    }
}

bitflags! {
    /// Categories of change to a domain container.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DomainChange: u8 {
        const NODE_ADDED = 1 << 0;
        const NODE_REMOVED = 1 << 1;
        const ELEMENT_ADDED = 1 << 2;
        const ELEMENT_REMOVED = 1 << 3;
    }
}

/// Coalesced changes from one field manager cache window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldManagerMessage {
    summary: FieldChange,
    changes: BTreeMap<String, FieldChange>,
}

impl FieldManagerMessage {
    pub(crate) fn new(changes: BTreeMap<String, FieldChange>) -> Self {
        let summary = changes
            .values()
            .fold(FieldChange::empty(), |acc, change| acc | *change);
        Self { summary, changes }
    }

    /// Union of every change in the message.
    #[must_use]
    pub fn summary(&self) -> FieldChange {
        self.summary
    }

    /// Change recorded for the field called `name`.
    #[must_use]
    pub fn change_for(&self, name: &str) -> FieldChange {
        self.changes.get(name).copied().unwrap_or_default()
    }

    /// Names of fields whose change intersects `filter`.
    pub fn changed_names(&self, filter: FieldChange) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(move |(_, change)| change.intersects(filter))
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Coalesced changes from one domain container cache window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainMessage {
    pub summary: DomainChange,
    pub nodes: BTreeSet<u32>,
    pub elements: BTreeSet<u32>,
}

impl DomainMessage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_union_of_changes() {
        let mut changes = BTreeMap::new();
        changes.insert("a".to_string(), FieldChange::ADD);
        changes.insert("b".to_string(), FieldChange::RESULT | FieldChange::IDENTIFIER);
        let message = FieldManagerMessage::new(changes);
        assert_eq!(
            message.summary(),
            FieldChange::ADD | FieldChange::RESULT | FieldChange::IDENTIFIER
        );
        assert_eq!(message.change_for("missing"), FieldChange::empty());
        let forwarded: Vec<_> = message.changed_names(FieldChange::RESULT).collect();
        assert_eq!(forwarded, vec!["b"]);
    }

    #[test]
    fn only_result_and_add_forward() {
        assert!(FieldChange::RESULT.forwards_to_parent());
        assert!(FieldChange::ADD.forwards_to_parent());
        assert!(!FieldChange::IDENTIFIER.forwards_to_parent());
        assert!(!FieldChange::REMOVE.forwards_to_parent());
        assert!((FieldChange::REMOVE | FieldChange::ADD).forwards_to_parent());
    }
}
