#![forbid(unsafe_code)]

//! Core: tree configuration, region naming rules, listener lists, and logging
//! bootstrap shared by the field and region layers.

pub mod config;
pub mod listener;
pub mod logging;
pub mod name;

pub use config::{TreeConfig, TreeConfigError, TreeConfigParse};
pub use listener::{ListenerId, ListenerList};
pub use name::{NameError, validate_name};
