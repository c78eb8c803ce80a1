//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required path field
pub fn validate_required_path(value: &Path, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.as_os_str().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(5u32, "count", "queue").is_ok());
        assert!(validate_positive(0usize, "count", "queue").is_err());
    }

    #[test]
    fn test_validate_required_path() {
        assert!(validate_required_path(&PathBuf::from("python3"), "executable", "daemon").is_ok());

        match validate_required_path(&PathBuf::new(), "executable", "daemon") {
            Err(ConfigError::DomainError { domain, message }) => {
                assert_eq!(domain, "daemon");
                assert!(message.contains("executable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
