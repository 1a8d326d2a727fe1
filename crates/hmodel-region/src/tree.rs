//! Region arena: lifecycle, tree mutation, change caching, field ownership
//! and attached objects.
//!
//! # Change caching
//!
//! Every region carries a local `change_level`. Mutations record into the
//! region's pending record; when the level returns to zero the record is
//! moved out and delivered once to each callback. Hierarchical changes
//! raise the level of a whole subtree at once, and regions moved under a
//! caching ancestor are raised to match (see [`RegionTree::insert_child_before`]).
//!
//! Field and domain containers follow the region's cache level, so field
//! messages are final before the region's own record is delivered.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hmodel_core::{ListenerId, TreeConfig, validate_name};
use hmodel_fields::{
    DomainContainer, FieldBackend, FieldError, FieldManager, FieldManagerMessage, MemoryBackend,
    SharedDomain,
};

use crate::change::{CallbackId, ChangeNotifier, PendingChanges, RegionChanges};
use crate::error::{RegionError, rejected};
use crate::id::RegionId;
use crate::ownership::{AttachVariant, FieldOwnership, SharedFields};

/// Opaque payload attached to a region. Compared by identity.
pub type AttachedObject = Rc<dyn Any>;

#[derive(Debug, Default)]
pub(crate) struct RegionNode {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<RegionId>,
    pub(crate) children: Vec<RegionId>,
    pub(crate) fields: Option<SharedFields>,
    pub(crate) domain: Option<SharedDomain>,
    objects: Vec<AttachedObject>,
    change_level: u32,
    hierarchical_change_level: u32,
    pending: PendingChanges,
    notifier: ChangeNotifier,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<RegionNode>,
}

/// Arena owning every region of one or more region trees.
pub struct RegionTree {
    config: TreeConfig,
    backend: Box<dyn FieldBackend>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl fmt::Debug for RegionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionTree")
            .field("config", &self.config)
            .field("regions", &self.len())
            .field("free_slots", &self.free.len())
            .finish()
    }
}

impl Default for RegionTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl Drop for RegionTree {
    fn drop(&mut self) {
        for region in self.top_level_regions() {
            if let Err(err) = self.detach_fields_hierarchical(region) {
                tracing::error!(region = %region, error = %err, "field teardown failed");
            }
        }
    }
}

impl RegionTree {
    /// Tree backed by the in-memory field backend.
    #[must_use]
    pub fn new(config: TreeConfig) -> Self {
        Self::with_backend(config, Box::new(MemoryBackend::new()))
    }

    #[must_use]
    pub fn with_backend(config: TreeConfig, backend: Box<dyn FieldBackend>) -> Self {
        Self {
            config,
            backend,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of live regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `region` names a live region.
    #[must_use]
    pub fn contains(&self, region: RegionId) -> bool {
        self.node(region).is_ok()
    }

    /// Live regions without a parent, in slot order.
    #[must_use]
    pub fn top_level_regions(&self) -> Vec<RegionId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let node = slot.node.as_ref()?;
                node.parent.is_none().then_some(RegionId {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect()
    }

    pub(crate) fn node(&self, region: RegionId) -> Result<&RegionNode, RegionError> {
        self.slots
            .get(region.index as usize)
            .filter(|slot| slot.generation == region.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(RegionError::MissingRegion { region })
    }

    pub(crate) fn node_mut(&mut self, region: RegionId) -> Result<&mut RegionNode, RegionError> {
        self.slots
            .get_mut(region.index as usize)
            .filter(|slot| slot.generation == region.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(RegionError::MissingRegion { region })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a bare, unnamed, fieldless region with no parent.
    pub fn create_region(&mut self) -> RegionId {
        let region = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(RegionNode::default());
                RegionId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(RegionNode::default()),
                });
                RegionId {
                    index,
                    generation: 0,
                }
            }
        };
        tracing::trace!(region = %region, "region created");
        region
    }

    /// Create a top-level region owning fresh fields.
    pub fn create_root(&mut self) -> Result<RegionId, RegionError> {
        let region = self.create_region();
        if let Err(err) = self.attach_fields(region, None, AttachVariant::Own) {
            self.discard(region);
            return Err(err);
        }
        Ok(region)
    }

    /// Create a named child appended under `parent`.
    ///
    /// The child shares the parent's shape registry, or owns fresh fields
    /// when the parent has none.
    pub fn create_child(&mut self, parent: RegionId, name: &str) -> Result<RegionId, RegionError> {
        self.validate_new_child(parent, name)
            .map_err(|err| rejected("create_child", err))?;
        let (master, variant) = if self.node(parent)?.fields.is_some() {
            (Some(parent), AttachVariant::ShareBases)
        } else {
            (None, AttachVariant::Own)
        };
        self.build_child(parent, name, master, variant)
    }

    /// Create a group of `master` named `name`, appended under `master`.
    pub fn create_group(&mut self, master: RegionId, name: &str) -> Result<RegionId, RegionError> {
        self.validate_new_group(master, name)
            .map_err(|err| rejected("create_group", err))?;
        self.build_child(master, name, Some(master), AttachVariant::ShareGroup)
    }

    fn validate_new_child(&self, parent: RegionId, name: &str) -> Result<(), RegionError> {
        self.node(parent)?;
        validate_name(name, &self.config)?;
        if self.is_group(parent)? {
            return Err(RegionError::GroupCannotHaveChildren { group: parent });
        }
        if self.find_child_by_name(parent, name).is_some() {
            return Err(RegionError::NameInUse {
                parent,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn validate_new_group(&self, master: RegionId, name: &str) -> Result<(), RegionError> {
        self.validate_new_child(master, name)?;
        if self.node(master)?.fields.is_none() {
            return Err(RegionError::MissingFields { region: master });
        }
        Ok(())
    }

    fn build_child(
        &mut self,
        parent: RegionId,
        name: &str,
        master: Option<RegionId>,
        variant: AttachVariant,
    ) -> Result<RegionId, RegionError> {
        let region = self.create_region();
        let built = self.node_mut(region).map(|node| node.name = Some(name.to_string()));
        let built = built
            .and_then(|()| self.attach_fields(region, master, variant))
            .and_then(|()| self.insert_child_before(parent, region, None));
        match built {
            Ok(()) => Ok(region),
            Err(err) => {
                self.discard(region);
                Err(err)
            }
        }
    }

    /// Destroy a detached top-level region and its whole subtree.
    ///
    /// Fields are detached top-down before any slot is freed. Regions still
    /// linked to a parent, or inside a change cache, are left alone.
    pub fn destroy_region(&mut self, region: RegionId) -> Result<(), RegionError> {
        let node = self
            .node(region)
            .map_err(|err| rejected("destroy_region", err))?;
        if let Some(parent) = node.parent {
            tracing::error!(region = %region, parent = %parent, "destroy of attached region refused");
            return Err(RegionError::StillAttached { region, parent });
        }
        for member in self.subtree(region)? {
            let node = self.node(member)?;
            let level = node.change_level.max(node.hierarchical_change_level);
            if level > 0 {
                tracing::error!(region = %member, level, "destroy inside change cache refused");
                return Err(RegionError::ChangeInProgress {
                    region: member,
                    level,
                });
            }
        }
        self.detach_fields_hierarchical(region)?;
        let freed = self.free_subtree(region)?;
        tracing::debug!(region = %region, freed, "region destroyed");
        Ok(())
    }

    /// Tear down a region created by a failed constructor.
    fn discard(&mut self, region: RegionId) {
        let parent = self.node(region).ok().and_then(|node| node.parent);
        if let Some(parent) = parent
            && let Err(err) = self.remove_child(parent, region)
        {
            tracing::error!(region = %region, error = %err, "unlink of discarded region failed");
        }
        if let Err(err) = self
            .detach_fields_hierarchical(region)
            .and_then(|()| self.free_subtree(region).map(|_| ()))
        {
            tracing::error!(region = %region, error = %err, "discard failed");
        }
    }

    fn free_subtree(&mut self, region: RegionId) -> Result<usize, RegionError> {
        let members = self.subtree(region)?;
        for member in &members {
            if let Some(slot) = self.slots.get_mut(member.index as usize) {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(member.index);
            }
        }
        Ok(members.len())
    }

    /// Release fields top-down across a subtree.
    ///
    /// An owning region stops forwarding to its parent and clears the owner
    /// back-reference before its children are visited.
    fn detach_fields_hierarchical(&mut self, region: RegionId) -> Result<(), RegionError> {
        let node = self.node_mut(region)?;
        node.domain = None;
        if let Some(fields) = node.fields.take() {
            let mut fields = fields.borrow_mut();
            if fields.owning_region() == Some(region) {
                fields.release_owner();
            }
        }
        for child in self.node(region)?.children.clone() {
            self.detach_fields_hierarchical(child)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn name(&self, region: RegionId) -> Result<Option<&str>, RegionError> {
        Ok(self.node(region)?.name.as_deref())
    }

    pub fn parent(&self, region: RegionId) -> Result<Option<RegionId>, RegionError> {
        Ok(self.node(region)?.parent)
    }

    pub fn children(&self, region: RegionId) -> Result<&[RegionId], RegionError> {
        Ok(&self.node(region)?.children)
    }

    pub fn child_count(&self, region: RegionId) -> Result<usize, RegionError> {
        Ok(self.node(region)?.children.len())
    }

    pub fn first_child(&self, region: RegionId) -> Result<Option<RegionId>, RegionError> {
        Ok(self.node(region)?.children.first().copied())
    }

    pub fn next_sibling(&self, region: RegionId) -> Result<Option<RegionId>, RegionError> {
        self.sibling_at(region, 1)
    }

    pub fn previous_sibling(&self, region: RegionId) -> Result<Option<RegionId>, RegionError> {
        self.sibling_at(region, -1)
    }

    fn sibling_at(&self, region: RegionId, offset: isize) -> Result<Option<RegionId>, RegionError> {
        let Some(parent) = self.node(region)?.parent else {
            return Ok(None);
        };
        let siblings = &self.node(parent)?.children;
        let Some(position) = siblings.iter().position(|child| *child == region) else {
            return Ok(None);
        };
        Ok(position
            .checked_add_signed(offset)
            .and_then(|index| siblings.get(index))
            .copied())
    }

    /// Top-level region of the tree containing `region`.
    pub fn root_of(&self, region: RegionId) -> Result<RegionId, RegionError> {
        let mut current = region;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    pub fn is_root(&self, region: RegionId) -> Result<bool, RegionError> {
        Ok(self.node(region)?.parent.is_none())
    }

    /// True when `other` is `region` or one of its descendants.
    #[must_use]
    pub fn contains_subregion(&self, region: RegionId, other: RegionId) -> bool {
        let mut current = Some(other);
        while let Some(id) = current {
            if id == region {
                return true;
            }
            current = self.node(id).ok().and_then(|node| node.parent);
        }
        false
    }

    /// `region` and its descendants, pre-order.
    pub fn subtree(&self, region: RegionId) -> Result<Vec<RegionId>, RegionError> {
        let mut out = Vec::new();
        let mut stack = vec![region];
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(out)
    }

    pub fn child_index(&self, parent: RegionId, child: RegionId) -> Result<usize, RegionError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(RegionError::NotAChild { parent, child });
        }
        self.node(parent)?
            .children
            .iter()
            .position(|id| *id == child)
            .ok_or(RegionError::NotAChild { parent, child })
    }

    /// Move `child` to position `index` among its siblings (clamped).
    pub fn set_child_index(
        &mut self,
        parent: RegionId,
        child: RegionId,
        index: usize,
    ) -> Result<(), RegionError> {
        let current = self
            .child_index(parent, child)
            .map_err(|err| rejected("set_child_index", err))?;
        let last = self.node(parent)?.children.len().saturating_sub(1);
        let index = index.min(last);
        if index == current {
            return Ok(());
        }
        self.begin_change(parent)?;
        let node = self.node_mut(parent)?;
        node.children.remove(current);
        node.children.insert(index, child);
        node.pending.children_changed();
        tracing::debug!(parent = %parent, child = %child, index, "child reordered");
        self.end_change(parent)
    }

    // ------------------------------------------------------------------
    // Naming
    // ------------------------------------------------------------------

    /// Rename `region`. Siblings must not already use `name`.
    pub fn set_name(&mut self, region: RegionId, name: &str) -> Result<(), RegionError> {
        self.validate_rename(region, name)
            .map_err(|err| rejected("set_name", err))?;
        if self.node(region)?.name.as_deref() == Some(name) {
            return Ok(());
        }
        self.begin_change(region)?;
        let node = self.node_mut(region)?;
        node.name = Some(name.to_string());
        node.pending.name_changed();
        tracing::debug!(region = %region, name, "region renamed");
        self.end_change(region)
    }

    fn validate_rename(&self, region: RegionId, name: &str) -> Result<(), RegionError> {
        validate_name(name, &self.config)?;
        if let Some(parent) = self.node(region)?.parent
            && let Some(existing) = self.find_child_by_name(parent, name)
            && existing != region
        {
            return Err(RegionError::NameInUse {
                parent,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    /// Insert `new_child` under `parent`, before `ref_child` or at the end.
    ///
    /// A child that already has a parent is first removed from it. The
    /// moved subtree's cache levels are adjusted to the hierarchical changes
    /// active along its new ancestor chain.
    pub fn insert_child_before(
        &mut self,
        parent: RegionId,
        new_child: RegionId,
        ref_child: Option<RegionId>,
    ) -> Result<(), RegionError> {
        let noop = self
            .validate_insert(parent, new_child, ref_child)
            .map_err(|err| rejected("insert_child", err))?;
        if noop {
            return Ok(());
        }
        let old_parent = self.node(new_child)?.parent;
        let old_sum = match old_parent {
            Some(old_parent) => self.hierarchical_sum(old_parent)?,
            None => 0,
        };
        let delta = i64::from(self.hierarchical_sum(parent)?) - i64::from(old_sum);
        self.begin_change(parent)?;
        let moved_from = old_parent.filter(|old_parent| *old_parent != parent);
        if let Some(old_parent) = moved_from {
            self.begin_change(old_parent)?;
        }
        if let Some(old_parent) = old_parent {
            self.unlink_child(old_parent, new_child)?;
        }
        let node = self.node_mut(parent)?;
        let position = ref_child
            .and_then(|reference| node.children.iter().position(|id| *id == reference))
            .unwrap_or(node.children.len());
        node.children.insert(position, new_child);
        self.node_mut(new_child)?.parent = Some(parent);
        if delta != 0 {
            self.delta_tree_change(new_child, delta)?;
        }
        self.node_mut(parent)?.pending.child_added(new_child);
        tracing::debug!(parent = %parent, child = %new_child, position, delta, "child inserted");
        if let Some(old_parent) = moved_from {
            self.end_change(old_parent)?;
        }
        self.end_change(parent)
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: RegionId, child: RegionId) -> Result<(), RegionError> {
        self.insert_child_before(parent, child, None)
    }

    /// Returns `Ok(true)` when the insert would change nothing.
    fn validate_insert(
        &self,
        parent: RegionId,
        new_child: RegionId,
        ref_child: Option<RegionId>,
    ) -> Result<bool, RegionError> {
        self.node(parent)?;
        let Some(name) = self.node(new_child)?.name.as_deref() else {
            return Err(RegionError::Unnamed { region: new_child });
        };
        if let Some(reference) = ref_child {
            if self.node(reference)?.parent != Some(parent) {
                return Err(RegionError::NotAChild {
                    parent,
                    child: reference,
                });
            }
            if reference == new_child {
                return Ok(true);
            }
        }
        if self.is_group(parent)? {
            return Err(RegionError::GroupCannotHaveChildren { group: parent });
        }
        if self.contains_subregion(new_child, parent) {
            return Err(RegionError::WouldCreateCycle {
                parent,
                child: new_child,
            });
        }
        if let Some(existing) = self.find_child_by_name(parent, name)
            && existing != new_child
        {
            return Err(RegionError::NameInUse {
                parent,
                name: name.to_string(),
            });
        }
        if self.is_group(new_child)? {
            let shared = match (&self.node(parent)?.fields, &self.node(new_child)?.fields) {
                (Some(master), Some(group)) => Rc::ptr_eq(master, group),
                _ => false,
            };
            if !shared {
                return Err(RegionError::GroupMasterMismatch {
                    parent,
                    group: new_child,
                });
            }
        }
        Ok(false)
    }

    /// Unlink `child` from `parent`, leaving it a detached top-level region.
    pub fn remove_child(&mut self, parent: RegionId, child: RegionId) -> Result<(), RegionError> {
        let node = self
            .node(child)
            .map_err(|err| rejected("remove_child", err))?;
        if node.parent != Some(parent) {
            return Err(rejected(
                "remove_child",
                RegionError::NotAChild { parent, child },
            ));
        }
        self.begin_change(parent)?;
        let old_sum = self.hierarchical_sum(parent)?;
        self.unlink_child(parent, child)?;
        if old_sum > 0 {
            self.delta_tree_change(child, -i64::from(old_sum))?;
        }
        tracing::debug!(parent = %parent, child = %child, "child removed");
        self.end_change(parent)
    }

    /// Detach `child` from `parent` and record the removal. Cache levels of
    /// the child's subtree are left for the caller to rebalance.
    fn unlink_child(&mut self, parent: RegionId, child: RegionId) -> Result<(), RegionError> {
        let name = self.node(child)?.name.clone();
        self.node_mut(parent)?.children.retain(|id| *id != child);
        self.node_mut(child)?.parent = None;
        self.node_mut(parent)?.pending.child_removed(child, name);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Change cache
    // ------------------------------------------------------------------

    pub fn change_level(&self, region: RegionId) -> Result<u32, RegionError> {
        Ok(self.node(region)?.change_level)
    }

    pub fn hierarchical_change_level(&self, region: RegionId) -> Result<u32, RegionError> {
        Ok(self.node(region)?.hierarchical_change_level)
    }

    /// Open (or nest) a change cache on `region` and its fields.
    pub fn begin_change(&mut self, region: RegionId) -> Result<(), RegionError> {
        let node = self.node_mut(region)?;
        node.change_level += 1;
        if let Some(fields) = &node.fields {
            fields.borrow_mut().manager_mut().begin_change();
        }
        if let Some(domain) = &node.domain {
            domain.borrow_mut().begin_change();
        }
        tracing::trace!(region = %region, level = node.change_level, "begin change");
        Ok(())
    }

    /// Close one change cache level. Closing the last level releases field
    /// messages first and then the region's pending record.
    pub fn end_change(&mut self, region: RegionId) -> Result<(), RegionError> {
        let node = self
            .node(region)
            .map_err(|err| rejected("end_change", err))?;
        if node.change_level == 0 {
            return Err(rejected(
                "end_change",
                RegionError::UnbalancedEndChange { region },
            ));
        }
        let fields = node.fields.clone();
        let domain = node.domain.clone();
        if let Some(domain) = &domain
            && domain.borrow().cache_level() == 0
        {
            return Err(rejected(
                "end_change",
                FieldError::UnbalancedEndChange {
                    resource: "domain container",
                }
                .into(),
            ));
        }
        if let Some(fields) = &fields
            && fields.borrow().manager().cache_level() == 0
        {
            return Err(rejected(
                "end_change",
                FieldError::UnbalancedEndChange {
                    resource: "field manager",
                }
                .into(),
            ));
        }
        if let Some(domain) = domain {
            domain.borrow_mut().end_change()?;
        }
        if let Some(fields) = fields {
            fields.borrow_mut().manager_mut().end_change()?;
        }
        self.forward_field_changes(region)?;
        let node = self.node_mut(region)?;
        node.change_level -= 1;
        let level = node.change_level;
        tracing::trace!(region = %region, level, "end change");
        if level == 0 {
            self.flush(region);
        }
        Ok(())
    }

    /// Begin a change on `region` and every descendant.
    pub fn begin_hierarchical_change(&mut self, region: RegionId) -> Result<(), RegionError> {
        self.node_mut(region)?.hierarchical_change_level += 1;
        self.delta_tree_change(region, 1)
    }

    /// End a change on `region` and every descendant, children first.
    pub fn end_hierarchical_change(&mut self, region: RegionId) -> Result<(), RegionError> {
        let node = self
            .node_mut(region)
            .map_err(|err| rejected("end_hierarchical_change", err))?;
        if node.hierarchical_change_level == 0 {
            return Err(rejected(
                "end_hierarchical_change",
                RegionError::UnbalancedHierarchicalEnd { region },
            ));
        }
        node.hierarchical_change_level -= 1;
        self.delta_tree_change(region, -1)
    }

    /// Sum of hierarchical change levels on `region` and its ancestors.
    fn hierarchical_sum(&self, region: RegionId) -> Result<u32, RegionError> {
        let mut sum = 0;
        let mut current = Some(region);
        while let Some(id) = current {
            let node = self.node(id)?;
            sum += node.hierarchical_change_level;
            current = node.parent;
        }
        Ok(sum)
    }

    /// Apply `delta` begin (positive) or end (negative) calls to every
    /// region of a subtree. Begins run pre-order, ends post-order.
    fn delta_tree_change(&mut self, region: RegionId, delta: i64) -> Result<(), RegionError> {
        if delta > 0 {
            for _ in 0..delta {
                self.begin_change(region)?;
            }
            for child in self.node(region)?.children.clone() {
                self.delta_tree_change(child, delta)?;
            }
        } else if delta < 0 {
            for child in self.node(region)?.children.clone() {
                self.delta_tree_change(child, delta)?;
            }
            for _ in 0..delta.unsigned_abs() {
                self.end_change(region)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, region: RegionId) {
        let Ok(node) = self.node_mut(region) else {
            return;
        };
        if node.pending.is_empty() {
            return;
        }
        let changes = node.pending.take(region);
        let callbacks = node.notifier.ids();
        tracing::debug!(
            region = %region,
            name_changed = changes.name_changed,
            children = ?changes.children,
            objects_changed = changes.objects_changed,
            callbacks = callbacks.len(),
            "region changes released"
        );
        for id in callbacks {
            let Some(mut callback) = self
                .node_mut(region)
                .ok()
                .and_then(|node| node.notifier.take(id))
            else {
                continue;
            };
            callback(self, &changes);
            if let Ok(node) = self.node_mut(region) {
                node.notifier.restore(id, callback);
            }
        }
    }

    /// Push queued field messages up the owner chain.
    ///
    /// Each parent field manager marks its same-named fields; a parent that
    /// is not caching releases at once and the walk continues from it.
    fn forward_field_changes(&mut self, region: RegionId) -> Result<(), RegionError> {
        let mut current = self.node(region)?.fields.clone();
        while let Some(fields) = current.take() {
            let messages = fields.borrow().take_forwarded();
            if messages.is_empty() {
                break;
            }
            let Some(owner) = fields.borrow().owning_region() else {
                break;
            };
            let Some(parent) = self.node(owner)?.parent else {
                break;
            };
            let Some(parent_fields) = self.node(parent)?.fields.clone() else {
                break;
            };
            if Rc::ptr_eq(&parent_fields, &fields) {
                break;
            }
            let mut marked = 0;
            {
                let mut target = parent_fields.borrow_mut();
                for message in &messages {
                    marked += target.manager_mut().propagate_hierarchical_changes(message);
                }
            }
            tracing::trace!(from = %owner, to = %parent, marked, "field changes forwarded");
            current = Some(parent_fields);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    /// Register a callback for `region`'s released change records.
    pub fn add_callback(
        &mut self,
        region: RegionId,
        callback: impl FnMut(&mut RegionTree, &RegionChanges) + 'static,
    ) -> Result<CallbackId, RegionError> {
        let node = self
            .node_mut(region)
            .map_err(|err| rejected("add_callback", err))?;
        Ok(node.notifier.add(Box::new(callback)))
    }

    pub fn remove_callback(
        &mut self,
        region: RegionId,
        callback: CallbackId,
    ) -> Result<(), RegionError> {
        let node = self
            .node_mut(region)
            .map_err(|err| rejected("remove_callback", err))?;
        if node.notifier.remove(callback) {
            Ok(())
        } else {
            Err(rejected(
                "remove_callback",
                RegionError::UnknownCallback { region, callback },
            ))
        }
    }

    pub fn callback_count(&self, region: RegionId) -> Result<usize, RegionError> {
        Ok(self.node(region)?.notifier.len())
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Attach fields to a fieldless region.
    ///
    /// `master` is required for [`AttachVariant::ShareBases`] and
    /// [`AttachVariant::ShareGroup`]. If the region is already caching, the
    /// new fields are raised to the same level. On failure the region stays
    /// fieldless.
    pub fn attach_fields(
        &mut self,
        region: RegionId,
        master: Option<RegionId>,
        variant: AttachVariant,
    ) -> Result<(), RegionError> {
        self.try_attach_fields(region, master, variant)
            .map_err(|err| rejected("attach_fields", err))
    }

    fn try_attach_fields(
        &mut self,
        region: RegionId,
        master: Option<RegionId>,
        variant: AttachVariant,
    ) -> Result<(), RegionError> {
        let node = self.node(region)?;
        if node.fields.is_some() {
            return Err(RegionError::FieldsAlreadyAttached { region });
        }
        let level = node.change_level;
        let (fields, domain) = match variant {
            AttachVariant::Own => {
                let manager = self.backend.create_field_manager()?;
                let domain = Rc::new(RefCell::new(
                    self.backend.create_domain_container(None, None)?,
                ));
                let fields = FieldOwnership::new(region, manager, Rc::clone(&domain));
                (Rc::new(RefCell::new(fields)), domain)
            }
            AttachVariant::ShareBases => {
                let master = master
                    .filter(|master| *master != region)
                    .ok_or(RegionError::InvalidMaster { region })?;
                let master_domain = self
                    .node(master)?
                    .domain
                    .clone()
                    .ok_or(RegionError::MissingFields { region: master })?;
                let bases = Rc::clone(master_domain.borrow().shared_bases());
                let manager = self.backend.create_field_manager()?;
                let domain = Rc::new(RefCell::new(
                    self.backend.create_domain_container(None, Some(&bases))?,
                ));
                let fields = FieldOwnership::new(region, manager, Rc::clone(&domain));
                (Rc::new(RefCell::new(fields)), domain)
            }
            AttachVariant::ShareGroup => {
                let master = master.ok_or(RegionError::InvalidMaster { region })?;
                if self.is_group(master)? {
                    return Err(RegionError::InvalidMaster { region: master });
                }
                let fields = self
                    .node(master)?
                    .fields
                    .clone()
                    .ok_or(RegionError::MissingFields { region: master })?;
                let master_domain = Rc::clone(fields.borrow().domain());
                let view = self
                    .backend
                    .create_domain_container(Some(&master_domain), None)?;
                (fields, Rc::new(RefCell::new(view)))
            }
        };
        for _ in 0..level {
            fields.borrow_mut().manager_mut().begin_change();
            domain.borrow_mut().begin_change();
        }
        let node = self.node_mut(region)?;
        node.fields = Some(fields);
        node.domain = Some(domain);
        tracing::debug!(region = %region, ?variant, caught_up = level, "fields attached");
        Ok(())
    }

    /// Field ownership record of `region`, shared with its groups.
    pub fn fields(&self, region: RegionId) -> Result<Option<SharedFields>, RegionError> {
        Ok(self.node(region)?.fields.clone())
    }

    /// Domain container of `region`: its own for a master, a restricted view
    /// for a group.
    pub fn domain(&self, region: RegionId) -> Result<Option<SharedDomain>, RegionError> {
        Ok(self.node(region)?.domain.clone())
    }

    /// True when `region` borrows another region's fields.
    pub fn is_group(&self, region: RegionId) -> Result<bool, RegionError> {
        Ok(self
            .node(region)?
            .fields
            .as_ref()
            .is_some_and(|fields| fields.borrow().owning_region() != Some(region)))
    }

    /// Listen to messages released by the field manager of `region`. Groups
    /// share their master's manager and listener list.
    pub fn register_field_listener(
        &mut self,
        region: RegionId,
        listener: impl FnMut(&FieldManagerMessage) + 'static,
    ) -> Result<ListenerId, RegionError> {
        let fields = self
            .node(region)
            .map_err(|err| rejected("register_field_listener", err))?
            .fields
            .clone()
            .ok_or_else(|| {
                rejected(
                    "register_field_listener",
                    RegionError::MissingFields { region },
                )
            })?;
        let id = fields.borrow_mut().manager_mut().register_listener(listener);
        Ok(id)
    }

    pub fn deregister_field_listener(
        &mut self,
        region: RegionId,
        listener: ListenerId,
    ) -> Result<(), RegionError> {
        let fields = self
            .node(region)
            .map_err(|err| rejected("deregister_field_listener", err))?
            .fields
            .clone()
            .ok_or(RegionError::MissingFields { region })
            .map_err(|err| rejected("deregister_field_listener", err))?;
        let result = fields.borrow_mut().manager_mut().deregister_listener(listener);
        result.map_err(|err| rejected("deregister_field_listener", err.into()))
    }

    /// Run `edit` against the region's field manager and domain inside one
    /// change cache window.
    pub fn edit_fields<R>(
        &mut self,
        region: RegionId,
        edit: impl FnOnce(&mut FieldManager, &mut DomainContainer) -> R,
    ) -> Result<R, RegionError> {
        let node = self
            .node(region)
            .map_err(|err| rejected("edit_fields", err))?;
        let (Some(fields), Some(domain)) = (node.fields.clone(), node.domain.clone()) else {
            return Err(rejected(
                "edit_fields",
                RegionError::MissingFields { region },
            ));
        };
        self.begin_change(region)?;
        let result = {
            let mut fields = fields.borrow_mut();
            let mut domain = domain.borrow_mut();
            edit(fields.manager_mut(), &mut domain)
        };
        self.end_change(region)?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Attached objects
    // ------------------------------------------------------------------

    pub fn attach_object(
        &mut self,
        region: RegionId,
        object: AttachedObject,
    ) -> Result<(), RegionError> {
        let node = self
            .node(region)
            .map_err(|err| rejected("attach_object", err))?;
        if node.objects.iter().any(|held| Rc::ptr_eq(held, &object)) {
            return Err(rejected(
                "attach_object",
                RegionError::ObjectAlreadyAttached { region },
            ));
        }
        self.begin_change(region)?;
        let node = self.node_mut(region)?;
        node.objects.push(object);
        node.pending.objects_changed();
        self.end_change(region)
    }

    pub fn detach_object(
        &mut self,
        region: RegionId,
        object: &AttachedObject,
    ) -> Result<(), RegionError> {
        let node = self
            .node(region)
            .map_err(|err| rejected("detach_object", err))?;
        let Some(position) = node.objects.iter().position(|held| Rc::ptr_eq(held, object)) else {
            return Err(rejected(
                "detach_object",
                RegionError::ObjectNotAttached { region },
            ));
        };
        self.begin_change(region)?;
        let node = self.node_mut(region)?;
        node.objects.remove(position);
        node.pending.objects_changed();
        self.end_change(region)
    }

    /// Attached objects in attach order.
    pub fn objects(&self, region: RegionId) -> Result<&[AttachedObject], RegionError> {
        Ok(&self.node(region)?.objects)
    }

    /// First attached object of type `T`.
    pub fn find_object<T: Any>(&self, region: RegionId) -> Result<Option<Rc<T>>, RegionError> {
        Ok(self
            .node(region)?
            .objects
            .iter()
            .find_map(|object| Rc::clone(object).downcast::<T>().ok()))
    }
}
