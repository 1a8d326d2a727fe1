#![forbid(unsafe_code)]

//! Region tree configuration.
//!
//! Defaults are suitable for most models; every field can be overridden from
//! the environment:
//!
//! - `HMODEL_PATH_SEPARATOR` (single char, default `/`)
//! - `HMODEL_PARENT_NAME` (string, default `..`)
//! - `HMODEL_MAX_NAME_LEN` (usize, default 255)
//! - `HMODEL_STRICT_NAMES` (bool)
//! - `HMODEL_MAX_PATH_DEPTH` (usize, default 256)
//!
//! Malformed values are reported as [`TreeConfigError`] diagnostics and the
//! affected setting keeps its default.

use std::env;
use std::fmt;

pub const ENV_PATH_SEPARATOR: &str = "HMODEL_PATH_SEPARATOR";
pub const ENV_PARENT_NAME: &str = "HMODEL_PARENT_NAME";
pub const ENV_MAX_NAME_LEN: &str = "HMODEL_MAX_NAME_LEN";
pub const ENV_STRICT_NAMES: &str = "HMODEL_STRICT_NAMES";
pub const ENV_MAX_PATH_DEPTH: &str = "HMODEL_MAX_PATH_DEPTH";

/// Settings shared by every region in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Character separating names in a region path.
    pub path_separator: char,
    /// Path segment that climbs to the parent region.
    pub parent_name: String,
    /// Longest accepted region name, in bytes.
    pub max_name_len: usize,
    /// Restrict names to ASCII alphanumerics plus `_`, `-` and `.`.
    pub strict_names: bool,
    /// Most segments a single path may resolve or create.
    pub max_path_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            path_separator: '/',
            parent_name: "..".to_string(),
            max_name_len: 255,
            strict_names: false,
            max_path_depth: 256,
        }
    }
}

/// Configuration parse diagnostics (env + validation).
#[derive(Debug, Clone)]
pub struct TreeConfigParse {
    pub config: TreeConfig,
    pub errors: Vec<TreeConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl TreeConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TreeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for TreeConfigError {}

impl TreeConfig {
    /// Parse config from environment variables.
    #[must_use]
    pub fn from_env() -> TreeConfig {
        let parsed = Self::from_env_with_diagnostics();
        for err in &parsed.errors {
            tracing::warn!(field = err.field, value = %err.value, "{}", err.message);
        }
        parsed.config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> TreeConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<TreeConfigError>> {
        let mut errors = Vec::new();
        if self.path_separator.is_alphanumeric() || self.path_separator.is_whitespace() {
            errors.push(TreeConfigError::new(
                "path_separator",
                self.path_separator.to_string(),
                "separator must be punctuation",
            ));
        }
        if self.parent_name.is_empty() {
            errors.push(TreeConfigError::new(
                "parent_name",
                "",
                "parent name must not be empty",
            ));
        } else if self.parent_name.contains(self.path_separator) {
            errors.push(TreeConfigError::new(
                "parent_name",
                self.parent_name.clone(),
                "parent name must not contain the path separator",
            ));
        }
        if self.max_name_len == 0 {
            errors.push(TreeConfigError::new(
                "max_name_len",
                "0",
                "expected positive integer",
            ));
        }
        if self.max_path_depth == 0 {
            errors.push(TreeConfigError::new(
                "max_path_depth",
                "0",
                "expected positive integer",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn from_env_with<F>(mut get: F) -> TreeConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = TreeConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_PATH_SEPARATOR) {
        let mut chars = value.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(separator), None) => config.path_separator = separator,
            _ => errors.push(TreeConfigError::new(
                "path_separator",
                value,
                "expected a single character",
            )),
        }
    }

    if let Some(value) = get(ENV_PARENT_NAME) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            errors.push(TreeConfigError::new(
                "parent_name",
                value,
                "expected non-empty name",
            ));
        } else {
            config.parent_name = trimmed.to_string();
        }
    }

    if let Some(value) = get(ENV_MAX_NAME_LEN) {
        match parse_usize(&value) {
            Some(parsed) => config.max_name_len = parsed,
            None => errors.push(TreeConfigError::new(
                "max_name_len",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Some(value) = get(ENV_STRICT_NAMES) {
        match parse_bool(&value) {
            Some(parsed) => config.strict_names = parsed,
            None => errors.push(TreeConfigError::new(
                "strict_names",
                value,
                "expected bool (1/0/true/false)",
            )),
        }
    }

    if let Some(value) = get(ENV_MAX_PATH_DEPTH) {
        match parse_usize(&value) {
            Some(parsed) => config.max_path_depth = parsed,
            None => errors.push(TreeConfigError::new(
                "max_path_depth",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Err(mut validation) = config.validate() {
        errors.append(&mut validation);
        config = TreeConfig::default();
    }

    TreeConfigParse { config, errors }
}

#[inline]
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[inline]
fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}
