//! Merging one region subtree into another.

use hmodel_fields::FieldDefinition;

use crate::error::{RegionError, rejected};
use crate::id::RegionId;
use crate::tree::RegionTree;

fn conflict(reason: String) -> RegionError {
    RegionError::MergeConflict { reason }
}

impl RegionTree {
    /// True when [`merge`](Self::merge) of `source` into `target` would
    /// succeed.
    #[must_use]
    pub fn can_merge(&self, target: RegionId, source: RegionId) -> bool {
        self.check_merge(target, source).is_ok()
    }

    /// Merge `source` into `target`.
    ///
    /// Field definitions and domain objects missing from `target` are added.
    /// Each child of `source` is merged into the same-named child of
    /// `target`; unmatched groups are recreated under `target` and other
    /// unmatched children are moved there. Everything runs inside one
    /// hierarchical change on `target`. Nothing changes when the regions
    /// are incompatible.
    pub fn merge(&mut self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        self.check_merge(target, source)
            .map_err(|err| rejected("merge", err))?;
        self.begin_hierarchical_change(target)?;
        let merged = self.merge_unchecked(target, source);
        self.end_hierarchical_change(target)?;
        merged?;
        tracing::debug!(target = %target, source = %source, "regions merged");
        Ok(())
    }

    fn check_merge(&self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        self.node(target)?;
        self.node(source)?;
        if self.contains_subregion(source, target) {
            return Err(RegionError::WouldCreateCycle {
                parent: target,
                child: source,
            });
        }
        self.check_merge_region(target, source)
    }

    fn check_merge_region(&self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        let label = self.name(source)?.unwrap_or("<top>").to_string();
        let target_group = self.is_group(target)?;
        if target_group != self.is_group(source)? {
            return Err(conflict(format!(
                "'{label}' is a group in only one of the regions"
            )));
        }
        if !target_group && let Some(source_fields) = self.fields(source)? {
            let Some(target_fields) = self.fields(target)? else {
                return Err(conflict(format!("'{label}' has no fields in the target")));
            };
            let source_fields = source_fields.borrow();
            let target_fields = target_fields.borrow();
            for definition in source_fields.manager().fields() {
                if let Some(existing) = target_fields.manager().find_field(&definition.name)
                    && existing != definition
                {
                    return Err(conflict(format!(
                        "field '{}' of '{label}' is defined differently",
                        definition.name
                    )));
                }
            }
            let source_domain = source_fields.domain().borrow();
            let target_domain = target_fields.domain().borrow();
            for id in source_domain.element_ids() {
                if let (Some(theirs), Some(ours)) =
                    (source_domain.element_shape(id), target_domain.element_shape(id))
                    && theirs != ours
                {
                    return Err(conflict(format!(
                        "element {id} of '{label}' is a {theirs} in the source and a {ours} in the target"
                    )));
                }
            }
        }
        for child in self.children(source)? {
            let name = self.name(*child)?.unwrap_or_default();
            match self.find_child_by_name(target, name) {
                Some(existing) => self.check_merge_region(existing, *child)?,
                None if self.is_group(*child)? && self.fields(target)?.is_none() => {
                    return Err(RegionError::MissingFields { region: target });
                }
                None => {}
            }
        }
        Ok(())
    }

    fn merge_unchecked(&mut self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        if self.is_group(source)? {
            self.merge_membership(target, source)?;
        } else {
            self.merge_contents(target, source)?;
        }
        for child in self.children(source)?.to_vec() {
            let name = self.name(child)?.unwrap_or_default().to_string();
            match self.find_child_by_name(target, &name) {
                Some(existing) => self.merge_unchecked(existing, child)?,
                None if self.is_group(child)? => {
                    let group = self.create_group(target, &name)?;
                    self.merge_unchecked(group, child)?;
                }
                None => self.insert_child_before(target, child, None)?,
            }
        }
        Ok(())
    }

    fn merge_contents(&mut self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        let Some(source_fields) = self.fields(source)? else {
            return Ok(());
        };
        let (definitions, nodes, elements) = {
            let fields = source_fields.borrow();
            let definitions: Vec<FieldDefinition> = fields.manager().fields().cloned().collect();
            let domain = fields.domain().borrow();
            let elements: Vec<(u32, String)> = domain
                .element_ids()
                .into_iter()
                .filter_map(|id| domain.element_shape(id).map(|shape| (id, shape)))
                .collect();
            (definitions, domain.node_ids(), elements)
        };
        self.edit_fields(target, |manager, domain| {
            for definition in definitions {
                if manager.find_field(&definition.name).is_none() {
                    manager.define_field(definition)?;
                }
            }
            for id in nodes {
                if !domain.contains_node(id) {
                    domain.add_node(id)?;
                }
            }
            for (id, shape) in elements {
                if !domain.contains_element(id) {
                    domain.add_element(id, &shape)?;
                }
            }
            Ok::<(), hmodel_fields::FieldError>(())
        })??;
        Ok(())
    }

    fn merge_membership(&mut self, target: RegionId, source: RegionId) -> Result<(), RegionError> {
        let Some(view) = self.domain(source)? else {
            return Ok(());
        };
        let (nodes, elements) = {
            let view = view.borrow();
            (view.node_ids(), view.element_ids())
        };
        self.edit_fields(target, |_, domain| {
            for id in nodes {
                if !domain.contains_node(id) {
                    domain.add_node(id)?;
                }
            }
            for id in elements {
                if !domain.contains_element(id) {
                    domain.add_element(id, "")?;
                }
            }
            Ok::<(), hmodel_fields::FieldError>(())
        })??;
        Ok(())
    }
}
