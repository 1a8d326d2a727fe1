//! Named field definitions with change caching.

use std::collections::BTreeMap;
use std::fmt;

use hmodel_core::{ListenerId, ListenerList};
use serde::{Deserialize, Serialize};

use crate::change::{FieldChange, FieldManagerMessage};
use crate::error::FieldError;

/// Value type carried by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Real,
    Integer,
    String,
    MeshLocation,
    /// Membership of nodes/elements (selection and subset fields).
    Group,
}

/// A field as seen by the region tree: name, value type and component count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub value_type: ValueType,
    pub components: u32,
}

impl FieldDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, components: u32) -> Self {
        Self {
            name: name.into(),
            value_type,
            components,
        }
    }

    /// Single-component real field.
    #[must_use]
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Real, 1)
    }
}

/// Manager of the fields defined in one master region.
///
/// Every edit records a [`FieldChange`] against the field's name. Outside a
/// change cache the edit is announced immediately; inside one, edits are
/// coalesced and announced once when the outermost `end_change` runs.
#[derive(Default)]
pub struct FieldManager {
    fields: BTreeMap<String, FieldDefinition>,
    cache_level: u32,
    pending: BTreeMap<String, FieldChange>,
    listeners: ListenerList<FieldManagerMessage>,
}

impl fmt::Debug for FieldManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldManager")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("cache_level", &self.cache_level)
            .field("pending", &self.pending)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl FieldManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or nest) a change cache.
    pub fn begin_change(&mut self) {
        self.cache_level += 1;
    }

    /// Close one level of change cache.
    ///
    /// When the outermost level closes with changes pending, the coalesced
    /// message is delivered to listeners and also returned.
    pub fn end_change(&mut self) -> Result<Option<FieldManagerMessage>, FieldError> {
        if self.cache_level == 0 {
            return Err(FieldError::UnbalancedEndChange {
                resource: "field manager",
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

    #[must_use]
    pub const fn is_caching(&self) -> bool {
        self.cache_level > 0
    }

    /// Define a new field.
    pub fn define_field(&mut self, definition: FieldDefinition) -> Result<(), FieldError> {
        if definition.name.is_empty() {
            return Err(FieldError::InvalidFieldName {
                name: definition.name,
            });
        }
        if self.fields.contains_key(&definition.name) {
            return Err(FieldError::DuplicateField {
                name: definition.name,
            });
        }
        let name = definition.name.clone();
        self.fields.insert(name.clone(), definition);
        self.record(name, FieldChange::ADD);
        Ok(())
    }

    /// Remove a field, returning its definition.
    pub fn remove_field(&mut self, name: &str) -> Result<FieldDefinition, FieldError> {
        let definition = self
            .fields
            .remove(name)
            .ok_or_else(|| FieldError::UnknownField {
                name: name.to_string(),
            })?;
        self.record(name.to_string(), FieldChange::REMOVE);
        Ok(definition)
    }

    /// Rename a field. Pending changes follow the field to its new name.
    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> Result<(), FieldError> {
        if new_name.is_empty() {
            return Err(FieldError::InvalidFieldName {
                name: new_name.to_string(),
            });
        }
        if !self.fields.contains_key(old_name) {
            return Err(FieldError::UnknownField {
                name: old_name.to_string(),
            });
        }
        if old_name == new_name {
            return Ok(());
        }
        if self.fields.contains_key(new_name) {
            return Err(FieldError::DuplicateField {
                name: new_name.to_string(),
            });
        }
        if let Some(mut definition) = self.fields.remove(old_name) {
            definition.name = new_name.to_string();
            self.fields.insert(new_name.to_string(), definition);
        }
        let carried = self.pending.remove(old_name).unwrap_or_default();
        self.pending
            .insert(new_name.to_string(), carried | FieldChange::IDENTIFIER);
        if self.cache_level == 0 {
            self.flush();
        }
        Ok(())
    }

    /// Replace the value type / component count of an existing field.
    pub fn redefine_field(&mut self, definition: FieldDefinition) -> Result<(), FieldError> {
        let Some(existing) = self.fields.get_mut(&definition.name) else {
            return Err(FieldError::UnknownField {
                name: definition.name,
            });
        };
        if *existing == definition {
            return Ok(());
        }
        *existing = definition.clone();
        self.record(definition.name, FieldChange::DEFINITION);
        Ok(())
    }

    /// Record that the values of `name` changed.
    pub fn mark_result_changed(&mut self, name: &str) -> Result<(), FieldError> {
        if !self.fields.contains_key(name) {
            return Err(FieldError::UnknownField {
                name: name.to_string(),
            });
        }
        self.record(name.to_string(), FieldChange::RESULT);
        Ok(())
    }

    /// Apply a child manager's forwarded message: every same-named field here
    /// is marked result-changed. Returns how many fields were marked.
    pub fn propagate_hierarchical_changes(&mut self, message: &FieldManagerMessage) -> usize {
        let names: Vec<String> = message
            .changed_names(FieldChange::FORWARDED)
            .filter(|name| self.fields.contains_key(*name))
            .map(str::to_string)
            .collect();
        let count = names.len();
        for name in names {
            let entry = self.pending.entry(name).or_default();
            *entry |= FieldChange::RESULT;
        }
        if count > 0 {
            tracing::trace!(count, "hierarchical field changes propagated");
            if self.cache_level == 0 {
                self.flush();
            }
        }
        count
    }

    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Iterate field definitions in name order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Changes recorded but not yet announced.
    #[must_use]
    pub fn pending_change(&self, name: &str) -> FieldChange {
        self.pending.get(name).copied().unwrap_or_default()
    }

    pub fn register_listener(
        &mut self,
        listener: impl FnMut(&FieldManagerMessage) + 'static,
    ) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn deregister_listener(&mut self, id: ListenerId) -> Result<(), FieldError> {
        if self.listeners.deregister(id) {
            Ok(())
        } else {
            Err(FieldError::UnknownListener { id })
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn record(&mut self, name: String, change: FieldChange) {
        let entry = self.pending.entry(name).or_default();
        *entry |= change;
        if self.cache_level == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) -> Option<FieldManagerMessage> {
        if self.pending.is_empty() {
            return None;
        }
        let message = FieldManagerMessage::new(std::mem::take(&mut self.pending));
        tracing::trace!(summary = ?message.summary(), "field manager changes released");
        self.listeners.notify(&message);
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_manager() -> (FieldManager, Rc<RefCell<Vec<FieldManagerMessage>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = FieldManager::new();
        let sink = Rc::clone(&log);
        manager.register_listener(move |message| sink.borrow_mut().push(message.clone()));
        (manager, log)
    }

    #[test]
    fn uncached_edits_notify_immediately() {
        let (mut manager, log) = recording_manager();
        manager.define_field(FieldDefinition::real("pressure")).unwrap();
        manager.mark_result_changed("pressure").unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary(), FieldChange::ADD);
        assert_eq!(log[1].summary(), FieldChange::RESULT);
    }

    #[test]
    fn cached_edits_coalesce() {
        let (mut manager, log) = recording_manager();
        manager.begin_change();
        manager.begin_change();
        manager.define_field(FieldDefinition::real("a")).unwrap();
        manager.define_field(FieldDefinition::real("b")).unwrap();
        manager.mark_result_changed("a").unwrap();
        assert!(manager.end_change().unwrap().is_none());
        assert!(log.borrow().is_empty());
        let message = manager.end_change().unwrap().expect("message at outermost end");
        assert_eq!(message.change_for("a"), FieldChange::ADD | FieldChange::RESULT);
        assert_eq!(message.change_for("b"), FieldChange::ADD);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unbalanced_end_is_rejected() {
        let mut manager = FieldManager::new();
        assert_eq!(
            manager.end_change(),
            Err(FieldError::UnbalancedEndChange {
                resource: "field manager"
            })
        );
        assert_eq!(manager.cache_level(), 0);
    }

    #[test]
    fn rename_carries_pending_changes() {
        let (mut manager, log) = recording_manager();
        manager.begin_change();
        manager.define_field(FieldDefinition::real("old")).unwrap();
        manager.rename_field("old", "new").unwrap();
        manager.end_change().unwrap();
        let log = log.borrow();
        assert_eq!(log[0].change_for("new"), FieldChange::ADD | FieldChange::IDENTIFIER);
        assert_eq!(log[0].change_for("old"), FieldChange::empty());
        assert!(manager.find_field("new").is_some());
        assert!(manager.find_field("old").is_none());
    }

    #[test]
    fn duplicate_and_unknown_fields_fail() {
        let mut manager = FieldManager::new();
        manager.define_field(FieldDefinition::real("x")).unwrap();
        assert!(matches!(
            manager.define_field(FieldDefinition::real("x")),
            Err(FieldError::DuplicateField { .. })
        ));
        assert!(matches!(
            manager.remove_field("y"),
            Err(FieldError::UnknownField { .. })
        ));
        manager.define_field(FieldDefinition::real("y")).unwrap();
        assert!(matches!(
            manager.rename_field("x", "y"),
            Err(FieldError::DuplicateField { .. })
        ));
    }

    #[test]
    fn propagation_marks_same_named_fields() {
        let mut child = FieldManager::new();
        child.begin_change();
        child.define_field(FieldDefinition::real("shared")).unwrap();
        child.define_field(FieldDefinition::real("child_only")).unwrap();
        let message = child.end_change().unwrap().unwrap();

        let (mut parent, log) = recording_manager();
        parent
            .define_field(FieldDefinition::new("shared", ValueType::Group, 1))
            .unwrap();
        log.borrow_mut().clear();
        assert_eq!(parent.propagate_hierarchical_changes(&message), 1);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].change_for("shared"), FieldChange::RESULT);
    }

    #[test]
    fn deregistered_listener_is_silent() {
        let (mut manager, log) = recording_manager();
        let id = manager.register_listener(|_| {});
        manager.deregister_listener(id).unwrap();
        assert_eq!(
            manager.deregister_listener(id),
            Err(FieldError::UnknownListener { id })
        );
        assert_eq!(manager.listener_count(), 1);
        manager.define_field(FieldDefinition::real("z")).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn definitions_serialize() {
        let definition = FieldDefinition::new("coordinates", ValueType::Real, 3);
        let json = serde_json::to_string(&definition).unwrap();
        assert!(json.contains("\"value_type\":\"real\""));
        let back: FieldDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, definition);
    }
}
