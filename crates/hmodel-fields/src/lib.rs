#![forbid(unsafe_code)]

//! Field containers for hmodel regions.
//!
//! A region never inspects field contents. It talks to this crate through a
//! narrow contract:
//!
//! - [`FieldBackend`] creates [`FieldManager`]s and [`DomainContainer`]s.
//! - Both support nested `begin_change` / `end_change` caching and deliver
//!   coalesced messages to registered listeners when the cache is released.
//!
//! Domain containers come in two flavours: a *master* container that owns its
//! node and element sets, and a *group* view restricted to a subset of a
//! master's objects. Containers created for the same tree reuse one
//! [`SharedBases`] registry of element shapes.

pub mod backend;
pub mod change;
pub mod domain;
pub mod error;
pub mod manager;

pub use backend::{FieldBackend, MemoryBackend};
pub use change::{DomainChange, DomainMessage, FieldChange, FieldManagerMessage};
pub use domain::{DomainContainer, ShapeId, ShapeRegistry, SharedBases, SharedDomain};
pub use error::FieldError;
pub use manager::{FieldDefinition, FieldManager, ValueType};
