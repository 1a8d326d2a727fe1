//! Region naming rules.

use std::fmt;

use crate::config::TreeConfig;

/// Reason a candidate region name was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong { len: usize, max: usize },
    ContainsSeparator { separator: char },
    ReservedParentName { name: String },
    InvalidCharacter { ch: char },
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name is empty"),
            Self::TooLong { len, max } => {
                write!(f, "name is {len} bytes long, limit is {max}")
            }
            Self::ContainsSeparator { separator } => {
                write!(f, "name contains path separator '{separator}'")
            }
            Self::ReservedParentName { name } => {
                write!(f, "name '{name}' is reserved for the parent path segment")
            }
            Self::InvalidCharacter { ch } => write!(f, "name contains invalid character {ch:?}"),
        }
    }
}

impl std::error::Error for NameError {}

/// Check `name` against the naming rules of `config`.
///
/// Names must be non-empty, fit within `max_name_len`, must not contain the
/// path separator and must differ from the parent path token. Strict mode
/// further limits names to ASCII alphanumerics, `_`, `-` and `.`.
pub fn validate_name(name: &str, config: &TreeConfig) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > config.max_name_len {
        return Err(NameError::TooLong {
            len: name.len(),
            max: config.max_name_len,
        });
    }
    if name.contains(config.path_separator) {
        return Err(NameError::ContainsSeparator {
            separator: config.path_separator,
        });
    }
    if name == config.parent_name {
        return Err(NameError::ReservedParentName {
            name: name.to_string(),
        });
    }
    if config.strict_names
        && let Some(ch) = name
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')))
    {
        return Err(NameError::InvalidCharacter { ch });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_ordinary_names() {
        let config = TreeConfig::default();
        assert!(validate_name("heart", &config).is_ok());
        assert!(validate_name("left ventricle", &config).is_ok());
    }

    #[test]
    fn rejects_separator_and_parent_token() {
        let config = TreeConfig::default();
        assert_eq!(
            validate_name("a/b", &config),
            Err(NameError::ContainsSeparator { separator: '/' })
        );
        assert!(matches!(
            validate_name("..", &config),
            Err(NameError::ReservedParentName { .. })
        ));
        assert_eq!(validate_name("", &config), Err(NameError::Empty));
    }

    #[test]
    fn strict_mode_limits_characters() {
        let config = TreeConfig {
            strict_names: true,
            ..TreeConfig::default()
        };
        assert!(validate_name("node_set-1.v2", &config).is_ok());
        assert_eq!(
            validate_name("left ventricle", &config),
            Err(NameError::InvalidCharacter { ch: ' ' })
        );
    }

    #[test]
    fn length_limit() {
        let config = TreeConfig {
            max_name_len: 4,
            ..TreeConfig::default()
        };
        assert!(validate_name("abcd", &config).is_ok());
        assert_eq!(
            validate_name("abcde", &config),
            Err(NameError::TooLong { len: 5, max: 4 })
        );
    }

    proptest! {
        #[test]
        fn names_with_separator_never_validate(prefix in "[a-z]{0,6}", suffix in "[a-z]{0,6}") {
            let config = TreeConfig::default();
            let name = format!("{prefix}/{suffix}");
            prop_assert!(validate_name(&name, &config).is_err());
        }
    }
}
