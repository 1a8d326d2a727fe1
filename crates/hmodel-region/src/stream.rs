//! Persistence hooks.
//!
//! File formats live outside this crate. A reader or writer exchanges a
//! [`RegionSnapshot`] with the tree through a [`StreamResource`]; the two
//! resources provided here hold the snapshot as JSON in memory or on disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use hmodel_fields::{FieldDefinition, FieldError};
use serde::{Deserialize, Serialize};

use crate::error::{RegionError, rejected};
use crate::id::RegionId;
use crate::tree::RegionTree;

/// Serializable image of a region subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegionSnapshot {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ElementSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RegionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub id: u32,
    pub shape: String,
}

/// Membership of one group region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<u32>,
    #[serde(default)]
    pub elements: Vec<u32>,
}

#[derive(Debug)]
pub enum StreamError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    /// Nothing has been written to the resource yet.
    Empty,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Json(err) => write!(f, "malformed snapshot: {err}"),
            Self::Empty => write!(f, "stream holds no snapshot"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::Empty => None,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// Carrier for snapshots read into or written from a region tree.
pub trait StreamResource {
    fn read_snapshot(&mut self) -> Result<RegionSnapshot, StreamError>;
    fn write_snapshot(&mut self, snapshot: &RegionSnapshot) -> Result<(), StreamError>;
}

/// JSON text held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    text: Option<String>,
}

impl MemoryStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_json(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl StreamResource for MemoryStream {
    fn read_snapshot(&mut self) -> Result<RegionSnapshot, StreamError> {
        let text = self.text.as_deref().ok_or(StreamError::Empty)?;
        Ok(serde_json::from_str(text)?)
    }

    fn write_snapshot(&mut self, snapshot: &RegionSnapshot) -> Result<(), StreamError> {
        self.text = Some(serde_json::to_string(snapshot)?);
        Ok(())
    }
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStream {
    path: PathBuf,
}

impl FileStream {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StreamError {
        StreamError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StreamResource for FileStream {
    fn read_snapshot(&mut self) -> Result<RegionSnapshot, StreamError> {
        let text = fs::read_to_string(&self.path).map_err(|err| self.io_error(err))?;
        if text.trim().is_empty() {
            return Err(StreamError::Empty);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write_snapshot(&mut self, snapshot: &RegionSnapshot) -> Result<(), StreamError> {
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, text).map_err(|err| self.io_error(err))
    }
}

impl RegionTree {
    /// Snapshot of `region` and its subtree. Groups are recorded as
    /// memberships of their master.
    pub fn snapshot(&self, region: RegionId) -> Result<RegionSnapshot, RegionError> {
        let node = self.node(region)?;
        let mut snapshot = RegionSnapshot {
            name: node.name.clone().unwrap_or_default(),
            ..RegionSnapshot::default()
        };
        if !self.is_group(region)?
            && let Some(fields) = &node.fields
        {
            let fields = fields.borrow();
            snapshot.fields = fields.manager().fields().cloned().collect();
            let domain = fields.domain().borrow();
            snapshot.nodes = domain.node_ids();
            snapshot.elements = domain
                .element_ids()
                .into_iter()
                .filter_map(|id| {
                    domain
                        .element_shape(id)
                        .map(|shape| ElementSnapshot { id, shape })
                })
                .collect();
        }
        for child in &node.children {
            if self.is_group(*child)? {
                let Some(view) = self.domain(*child)? else {
                    continue;
                };
                let view = view.borrow();
                snapshot.groups.push(GroupSnapshot {
                    name: self.name(*child)?.unwrap_or_default().to_string(),
                    nodes: view.node_ids(),
                    elements: view.element_ids(),
                });
            } else {
                snapshot.children.push(self.snapshot(*child)?);
            }
        }
        Ok(snapshot)
    }

    /// Write the subtree of `region` to `stream`.
    pub fn write(
        &self,
        region: RegionId,
        stream: &mut dyn StreamResource,
    ) -> Result<(), RegionError> {
        let snapshot = self
            .snapshot(region)
            .map_err(|err| rejected("write", err))?;
        stream
            .write_snapshot(&snapshot)
            .map_err(|err| rejected("write", err.into()))?;
        tracing::debug!(region = %region, "region written");
        Ok(())
    }

    /// Read a snapshot from `stream` and merge it into `region`.
    ///
    /// The snapshot is built into a detached staging region first, so a
    /// malformed or incompatible snapshot leaves `region` untouched.
    pub fn read(
        &mut self,
        region: RegionId,
        stream: &mut dyn StreamResource,
    ) -> Result<(), RegionError> {
        self.node(region).map_err(|err| rejected("read", err))?;
        let snapshot = stream
            .read_snapshot()
            .map_err(|err| rejected("read", err.into()))?;
        let staging = self
            .build_from_snapshot(&snapshot)
            .map_err(|err| rejected("read", err))?;
        let merged = self.merge(region, staging);
        if let Err(err) = self.destroy_region(staging) {
            tracing::error!(staging = %staging, error = %err, "staging region left behind");
        }
        merged?;
        tracing::debug!(region = %region, "region read");
        Ok(())
    }

    fn build_from_snapshot(&mut self, snapshot: &RegionSnapshot) -> Result<RegionId, RegionError> {
        let staging = self.create_root()?;
        self.begin_hierarchical_change(staging)?;
        let populated = self.populate(staging, snapshot);
        self.end_hierarchical_change(staging)?;
        if let Err(err) = populated {
            if let Err(cleanup) = self.destroy_region(staging) {
                tracing::error!(staging = %staging, error = %cleanup, "staging region left behind");
            }
            return Err(err);
        }
        Ok(staging)
    }

    fn populate(&mut self, region: RegionId, snapshot: &RegionSnapshot) -> Result<(), RegionError> {
        self.edit_fields(region, |manager, domain| {
            for definition in &snapshot.fields {
                manager.define_field(definition.clone())?;
            }
            for id in &snapshot.nodes {
                domain.add_node(*id)?;
            }
            for element in &snapshot.elements {
                domain.add_element(element.id, &element.shape)?;
            }
            Ok::<(), FieldError>(())
        })??;
        for group in &snapshot.groups {
            let id = self.create_group(region, &group.name)?;
            self.edit_fields(id, |_, domain| {
                for node in &group.nodes {
                    domain.add_node(*node)?;
                }
                for element in &group.elements {
                    domain.add_element(*element, "")?;
                }
                Ok::<(), FieldError>(())
            })??;
        }
        for child in &snapshot.children {
            let id = self.create_child(region, &child.name)?;
            self.populate(id, child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_memory_stream_reports_empty() {
        let mut stream = MemoryStream::new();
        assert!(matches!(stream.read_snapshot(), Err(StreamError::Empty)));
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut stream = MemoryStream::from_json("{ not json");
        assert!(matches!(stream.read_snapshot(), Err(StreamError::Json(_))));
    }

    #[test]
    fn sparse_json_fills_defaults() {
        let mut stream = MemoryStream::from_json(r#"{"children":[{"name":"a"}]}"#);
        let snapshot = stream.read_snapshot().unwrap();
        assert_eq!(snapshot.name, "");
        assert_eq!(snapshot.children[0].name, "a");
        assert!(snapshot.children[0].fields.is_empty());
    }

    #[test]
    fn bad_snapshot_leaves_target_untouched() {
        let mut tree = RegionTree::default();
        let root = tree.create_root().unwrap();
        let before = tree.len();
        let mut stream = MemoryStream::from_json(r#"{"nodes":[1,1]}"#);
        assert!(matches!(
            tree.read(root, &mut stream),
            Err(RegionError::Field(FieldError::DuplicateNode { id: 1 }))
        ));
        assert_eq!(tree.len(), before);
        let mut stream = MemoryStream::from_json(r#"{"children":[{"name":".."}]}"#);
        assert!(matches!(
            tree.read(root, &mut stream),
            Err(RegionError::InvalidName(_))
        ));
        assert_eq!(tree.child_count(root).unwrap(), 0);
        assert_eq!(tree.len(), before);
    }
}
