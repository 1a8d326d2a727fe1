use std::fmt;

use hmodel_core::NameError;
use hmodel_fields::FieldError;

use crate::change::CallbackId;
use crate::id::RegionId;
use crate::stream::StreamError;

/// Failures reported by [`RegionTree`](crate::RegionTree) operations.
///
/// Every rejected operation leaves the tree as it was before the call.
#[derive(Debug)]
pub enum RegionError {
    /// Handle does not name a live region.
    MissingRegion { region: RegionId },
    /// Only named regions can be inserted as children.
    Unnamed { region: RegionId },
    InvalidName(NameError),
    NameInUse { parent: RegionId, name: String },
    NotAChild { parent: RegionId, child: RegionId },
    WouldCreateCycle { parent: RegionId, child: RegionId },
    GroupCannotHaveChildren { group: RegionId },
    /// A group may only be parented by the region owning its fields.
    GroupMasterMismatch { parent: RegionId, group: RegionId },
    UnbalancedEndChange { region: RegionId },
    UnbalancedHierarchicalEnd { region: RegionId },
    UnknownCallback { region: RegionId, callback: CallbackId },
    FieldsAlreadyAttached { region: RegionId },
    MissingFields { region: RegionId },
    InvalidMaster { region: RegionId },
    /// Only detached top-level regions can be destroyed.
    StillAttached { region: RegionId, parent: RegionId },
    ChangeInProgress { region: RegionId, level: u32 },
    ObjectAlreadyAttached { region: RegionId },
    ObjectNotAttached { region: RegionId },
    AlreadyExists { path: String },
    /// Parent token used at a top-level region.
    NoParent { region: RegionId },
    PathTooDeep { depth: usize, max: usize },
    MergeConflict { reason: String },
    Field(FieldError),
    Stream(StreamError),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRegion { region } => write!(f, "{region} does not exist"),
            Self::Unnamed { region } => write!(f, "{region} has no name"),
            Self::InvalidName(err) => write!(f, "invalid region name: {err}"),
            Self::NameInUse { parent, name } => {
                write!(f, "{parent} already has a child named '{name}'")
            }
            Self::NotAChild { parent, child } => write!(f, "{child} is not a child of {parent}"),
            Self::WouldCreateCycle { parent, child } => {
                write!(f, "inserting {child} under {parent} would create a cycle")
            }
            Self::GroupCannotHaveChildren { group } => {
                write!(f, "group {group} cannot have children")
            }
            Self::GroupMasterMismatch { parent, group } => {
                write!(f, "group {group} does not share the fields of {parent}")
            }
            Self::UnbalancedEndChange { region } => {
                write!(f, "end_change on {region} without matching begin_change")
            }
            Self::UnbalancedHierarchicalEnd { region } => write!(
                f,
                "end_hierarchical_change on {region} without matching begin_hierarchical_change"
            ),
            Self::UnknownCallback { region, callback } => {
                write!(f, "{callback} is not registered on {region}")
            }
            Self::FieldsAlreadyAttached { region } => {
                write!(f, "{region} already has fields attached")
            }
            Self::MissingFields { region } => write!(f, "{region} has no fields attached"),
            Self::InvalidMaster { region } => {
                write!(f, "{region} cannot be used as a field master")
            }
            Self::StillAttached { region, parent } => {
                write!(f, "{region} is still a child of {parent}")
            }
            Self::ChangeInProgress { region, level } => {
                write!(f, "{region} is inside a change cache (level {level})")
            }
            Self::ObjectAlreadyAttached { region } => {
                write!(f, "object is already attached to {region}")
            }
            Self::ObjectNotAttached { region } => write!(f, "object is not attached to {region}"),
            Self::AlreadyExists { path } => write!(f, "a region already exists at '{path}'"),
            Self::NoParent { region } => write!(f, "{region} has no parent"),
            Self::PathTooDeep { depth, max } => {
                write!(f, "path has {depth} segments, limit is {max}")
            }
            Self::MergeConflict { reason } => write!(f, "cannot merge: {reason}"),
            Self::Field(err) => write!(f, "field error: {err}"),
            Self::Stream(err) => write!(f, "stream error: {err}"),
        }
    }
}

impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(err) => Some(err),
            Self::Field(err) => Some(err),
            Self::Stream(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NameError> for RegionError {
    fn from(err: NameError) -> Self {
        Self::InvalidName(err)
    }
}

impl From<FieldError> for RegionError {
    fn from(err: FieldError) -> Self {
        Self::Field(err)
    }
}

impl From<StreamError> for RegionError {
    fn from(err: StreamError) -> Self {
        Self::Stream(err)
    }
}

/// Log a rejected operation and hand the error back.
pub(crate) fn rejected(op: &'static str, err: RegionError) -> RegionError {
    tracing::warn!(op, error = %err, "region operation rejected");
    err
}
