#![forbid(unsafe_code)]

//! Hierarchical model regions.
//!
//! A [`RegionTree`] is an arena of named regions addressed by [`RegionId`].
//! Each region may own fields (a field manager plus a node/element domain) or
//! share the fields of its master as a *group* restricted to a subset of the
//! master's domain objects.
//!
//! Edits are bracketed by `begin_change` / `end_change`. Whatever happens to a
//! region inside one bracket is delivered to its callbacks as a single
//! [`RegionChanges`] record once the outermost bracket closes.
//!
//! ```
//! use hmodel_region::{ChildChange, RegionTree};
//!
//! let mut tree = RegionTree::default();
//! let root = tree.create_root().unwrap();
//! tree.begin_change(root).unwrap();
//! tree.create_child(root, "heart").unwrap();
//! tree.create_child(root, "lungs").unwrap();
//! tree.add_callback(root, |_, changes| {
//!     assert_eq!(changes.children, ChildChange::Multiple);
//! })
//! .unwrap();
//! tree.end_change(root).unwrap();
//! assert_eq!(tree.get_path(tree.find_subregion_at_path(root, "lungs").unwrap()).unwrap(), "lungs");
//! ```

pub mod change;
pub mod error;
pub mod id;
mod merge;
pub mod ownership;
mod path;
pub mod stream;
pub mod tree;

pub use change::{CallbackId, ChildChange, RegionCallback, RegionChanges};
pub use error::RegionError;
pub use id::RegionId;
pub use ownership::{AttachVariant, FieldOwnership, SharedFields};
pub use stream::{
    ElementSnapshot, FileStream, GroupSnapshot, MemoryStream, RegionSnapshot, StreamError,
    StreamResource,
};
pub use tree::{AttachedObject, RegionTree};
