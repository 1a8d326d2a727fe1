//! Path resolution and creation.
//!
//! A path is a list of names joined by the configured separator. Empty
//! segments are skipped, so leading, trailing and doubled separators change
//! nothing. The parent token (`..` by default) climbs one level.

use std::fmt::Write as _;

use hmodel_core::validate_name;

use crate::error::{RegionError, rejected};
use crate::id::RegionId;
use crate::tree::RegionTree;

enum Segment<'a> {
    Parent,
    Child(&'a str),
}

struct PathPlan {
    creates: usize,
    /// The walk finishes on a region that already exists, possibly after
    /// climbing back out of regions it would create.
    ends_at_existing: bool,
}

impl RegionTree {
    fn segments<'a>(&self, path: &'a str) -> Result<Vec<Segment<'a>>, RegionError> {
        let config = self.config();
        let segments: Vec<Segment<'a>> = path
            .split(config.path_separator)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment == config.parent_name {
                    Segment::Parent
                } else {
                    Segment::Child(segment)
                }
            })
            .collect();
        if segments.len() > config.max_path_depth {
            return Err(RegionError::PathTooDeep {
                depth: segments.len(),
                max: config.max_path_depth,
            });
        }
        Ok(segments)
    }

    /// Child of `parent` called `name`.
    #[must_use]
    pub fn find_child_by_name(&self, parent: RegionId, name: &str) -> Option<RegionId> {
        let node = self.node(parent).ok()?;
        node.children.iter().copied().find(|child| {
            self.node(*child)
                .is_ok_and(|child| child.name.as_deref() == Some(name))
        })
    }

    /// Region at `path` relative to `root`. Never creates regions.
    #[must_use]
    pub fn find_subregion_at_path(&self, root: RegionId, path: &str) -> Option<RegionId> {
        let (region, remainder) = self.resolve_partial_path(root, path).ok()?;
        remainder.is_empty().then_some(region)
    }

    /// Deepest region reachable along `path`, with the unresolved remainder.
    ///
    /// The remainder is empty when the whole path resolved.
    pub fn resolve_partial_path(
        &self,
        root: RegionId,
        path: &str,
    ) -> Result<(RegionId, String), RegionError> {
        self.node(root)?;
        let separator = self.config().path_separator;
        let segments = self.segments(path)?;
        let mut current = root;
        for (index, segment) in segments.iter().enumerate() {
            let next = match segment {
                Segment::Parent => self.node(current)?.parent,
                Segment::Child(name) => self.find_child_by_name(current, name),
            };
            let Some(next) = next else {
                let remainder = path
                    .split(separator)
                    .filter(|segment| !segment.is_empty())
                    .skip(index)
                    .collect::<Vec<_>>()
                    .join(separator.to_string().as_str());
                return Ok((current, remainder));
            };
            current = next;
        }
        Ok((current, String::new()))
    }

    /// Create every missing region along `path`.
    ///
    /// Fails with [`RegionError::AlreadyExists`] when nothing would be
    /// created. Creation runs inside a hierarchical change on `root`.
    pub fn create_subregion_at_path(
        &mut self,
        root: RegionId,
        path: &str,
    ) -> Result<RegionId, RegionError> {
        self.ensure_path(root, path, true)
            .map_err(|err| rejected("create_subregion_at_path", err))
    }

    /// Region at `path`, creating any missing levels.
    pub fn create_children_from_path(
        &mut self,
        root: RegionId,
        path: &str,
    ) -> Result<RegionId, RegionError> {
        self.ensure_path(root, path, false)
            .map_err(|err| rejected("create_children_from_path", err))
    }

    fn ensure_path(
        &mut self,
        root: RegionId,
        path: &str,
        require_new: bool,
    ) -> Result<RegionId, RegionError> {
        let plan = self.plan_path(root, path)?;
        if require_new && plan.ends_at_existing {
            return Err(RegionError::AlreadyExists {
                path: path.to_string(),
            });
        }
        let creates = plan.creates;
        if creates == 0 {
            return self
                .find_subregion_at_path(root, path)
                .ok_or(RegionError::MissingRegion { region: root });
        }
        self.begin_hierarchical_change(root)?;
        let created = self.walk_creating(root, path);
        self.end_hierarchical_change(root)?;
        let region = created?;
        tracing::debug!(root = %root, path, created = creates, "path created");
        Ok(region)
    }

    /// Check `path` can be created and count how many regions that takes.
    fn plan_path(&self, root: RegionId, path: &str) -> Result<PathPlan, RegionError> {
        self.node(root)?;
        let mut current = root;
        let mut pending: Vec<&str> = Vec::new();
        let mut creates = 0;
        for segment in self.segments(path)? {
            match segment {
                Segment::Parent => {
                    if pending.pop().is_none() {
                        current = self
                            .node(current)?
                            .parent
                            .ok_or(RegionError::NoParent { region: current })?;
                    }
                }
                Segment::Child(name) => {
                    validate_name(name, self.config())?;
                    if pending.is_empty() {
                        if let Some(child) = self.find_child_by_name(current, name) {
                            current = child;
                            continue;
                        }
                        if self.is_group(current)? {
                            return Err(RegionError::GroupCannotHaveChildren { group: current });
                        }
                    }
                    pending.push(name);
                    creates += 1;
                }
            }
        }
        Ok(PathPlan {
            creates,
            ends_at_existing: pending.is_empty(),
        })
    }

    fn walk_creating(&mut self, root: RegionId, path: &str) -> Result<RegionId, RegionError> {
        let mut current = root;
        for segment in self.segments(path)? {
            current = match segment {
                Segment::Parent => self
                    .node(current)?
                    .parent
                    .ok_or(RegionError::NoParent { region: current })?,
                Segment::Child(name) => match self.find_child_by_name(current, name) {
                    Some(child) => child,
                    None => self.create_child(current, name)?,
                },
            };
        }
        Ok(current)
    }

    /// Path from the top-level region down to `region`.
    ///
    /// The top-level region's own name is not part of the path, so a
    /// top-level region has the empty path.
    pub fn get_path(&self, region: RegionId) -> Result<String, RegionError> {
        let mut names = Vec::new();
        let mut current = region;
        while let Some(parent) = self.node(current)?.parent {
            names.push(self.node(current)?.name.clone().unwrap_or_default());
            current = parent;
        }
        names.reverse();
        Ok(names.join(self.config().path_separator.to_string().as_str()))
    }

    /// Path leading from `base` to `region`, climbing with the parent token.
    ///
    /// `None` when the regions belong to different trees.
    pub fn get_relative_path(
        &self,
        region: RegionId,
        base: RegionId,
    ) -> Result<Option<String>, RegionError> {
        let region_chain = self.ancestor_chain(region)?;
        let base_chain = self.ancestor_chain(base)?;
        if region_chain.last() != base_chain.last() {
            return Ok(None);
        }
        let shared = region_chain
            .iter()
            .rev()
            .zip(base_chain.iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        let config = self.config();
        let mut segments: Vec<String> = (0..base_chain.len() - shared)
            .map(|_| config.parent_name.clone())
            .collect();
        for id in region_chain[..region_chain.len() - shared].iter().rev() {
            segments.push(self.node(*id)?.name.clone().unwrap_or_default());
        }
        Ok(Some(segments.join(config.path_separator.to_string().as_str())))
    }

    /// `region` followed by its ancestors up to the top-level region.
    fn ancestor_chain(&self, region: RegionId) -> Result<Vec<RegionId>, RegionError> {
        let mut chain = vec![region];
        let mut current = region;
        while let Some(parent) = self.node(current)?.parent {
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    /// Indented listing of the subtree names, two spaces per level.
    pub fn list_hierarchy(&self, region: RegionId) -> Result<String, RegionError> {
        let mut out = String::new();
        self.list_into(region, 0, &mut out)?;
        Ok(out)
    }

    fn list_into(&self, region: RegionId, depth: usize, out: &mut String) -> Result<(), RegionError> {
        let node = self.node(region)?;
        let name = node.name.as_deref().unwrap_or("<unnamed>");
        let marker = if self.is_group(region)? { " (group)" } else { "" };
        let _ = writeln!(out, "{:indent$}{name}{marker}", "", indent = depth * 2);
        for child in &node.children {
            self.list_into(*child, depth + 1, out)?;
        }
        Ok(())
    }
}
