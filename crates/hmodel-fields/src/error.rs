use std::fmt;

use hmodel_core::ListenerId;

/// Failures reported by field managers, domain containers and backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Backend could not provide a new manager or container.
    AllocationFailed { resource: &'static str },
    DuplicateField { name: String },
    UnknownField { name: String },
    InvalidFieldName { name: String },
    UnknownListener { id: ListenerId },
    /// `end_change` called with no matching `begin_change`.
    UnbalancedEndChange { resource: &'static str },
    DuplicateNode { id: u32 },
    UnknownNode { id: u32 },
    DuplicateElement { id: u32 },
    UnknownElement { id: u32 },
    /// Group views may only reference objects present in their master.
    NotInMaster { kind: &'static str, id: u32 },
    /// Group views cannot be built on top of another group view.
    InvalidMaster,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { resource } => write!(f, "could not allocate {resource}"),
            Self::DuplicateField { name } => write!(f, "field '{name}' is already defined"),
            Self::UnknownField { name } => write!(f, "no field named '{name}'"),
            Self::InvalidFieldName { name } => write!(f, "'{name}' is not a valid field name"),
            Self::UnknownListener { id } => write!(f, "{id} is not registered"),
            Self::UnbalancedEndChange { resource } => {
                write!(f, "{resource} end_change without matching begin_change")
            }
            Self::DuplicateNode { id } => write!(f, "node {id} already present"),
            Self::UnknownNode { id } => write!(f, "node {id} not found"),
            Self::DuplicateElement { id } => write!(f, "element {id} already present"),
            Self::UnknownElement { id } => write!(f, "element {id} not found"),
            Self::NotInMaster { kind, id } => {
                write!(f, "{kind} {id} is not present in the master container")
            }
            Self::InvalidMaster => write!(f, "master container must not itself be a group"),
        }
    }
}

impl std::error::Error for FieldError {}
