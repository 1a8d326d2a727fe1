#![forbid(unsafe_code)]

//! hmodel public facade crate.
//!
//! Re-exports the region tree, the field layer it consumes and the shared
//! configuration, plus a prelude for day-to-day use.

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use hmodel_core::logging::{self, LogFormat, LoggingError};
pub use hmodel_core::{
    ListenerId, NameError, TreeConfig, TreeConfigError, TreeConfigParse, validate_name,
};

// --- Field re-exports ------------------------------------------------------

pub use hmodel_fields::{
    DomainChange, DomainContainer, DomainMessage, FieldBackend, FieldChange, FieldDefinition,
    FieldError, FieldManager, FieldManagerMessage, MemoryBackend, SharedDomain, ValueType,
};

// --- Region re-exports -----------------------------------------------------

pub use hmodel_region::{
    AttachVariant, AttachedObject, CallbackId, ChildChange, FieldOwnership, FileStream,
    MemoryStream, RegionChanges, RegionError, RegionId, RegionSnapshot, RegionTree, SharedFields,
    StreamError, StreamResource,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for hmodel applications.
#[derive(Debug)]
pub enum Error {
    Region(RegionError),
    /// Rejected `HMODEL_*` environment settings.
    Config(Vec<TreeConfigError>),
    Logging(LoggingError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region(err) => write!(f, "{err}"),
            Self::Config(errors) => {
                write!(f, "invalid configuration:")?;
                for err in errors {
                    write!(f, " {err};")?;
                }
                Ok(())
            }
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Region(err) => Some(err),
            Self::Config(errors) => errors
                .first()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<RegionError> for Error {
    fn from(err: RegionError) -> Self {
        Self::Region(err)
    }
}

impl From<FieldError> for Error {
    fn from(err: FieldError) -> Self {
        Self::Region(RegionError::Field(err))
    }
}

impl From<StreamError> for Error {
    fn from(err: StreamError) -> Self {
        Self::Region(RegionError::Stream(err))
    }
}

impl From<LoggingError> for Error {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

/// Standard result type for hmodel APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Build a tree from `HMODEL_*` environment settings.
///
/// Unlike [`TreeConfig::from_env`], malformed settings are an error rather
/// than a silent fallback to defaults.
pub fn tree_from_env() -> Result<RegionTree> {
    let parsed = TreeConfig::from_env_with_diagnostics();
    if !parsed.errors.is_empty() {
        return Err(Error::Config(parsed.errors));
    }
    Ok(RegionTree::new(parsed.config))
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        AttachVariant, ChildChange, Error, FieldDefinition, RegionChanges, RegionId, RegionTree,
        Result, TreeConfig, ValueType,
    };

    pub use crate::{core, fields, region};
}

pub use hmodel_core as core;
pub use hmodel_fields as fields;
pub use hmodel_region as region;
