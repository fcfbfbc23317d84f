//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (store capacities, log level)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CaptureConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::CaptureConfig;

/// Largest store capacity accepted from configuration.
pub const MAX_STORE_CAPACITY: usize = 1_000_000;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be between 1 and {max}, got {value}")]
    CapacityOutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &CaptureConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("max_log_number", config.max_log_number),
        ("max_network_number", config.max_network_number),
    ] {
        if value == 0 || value > MAX_STORE_CAPACITY {
            errors.push(ValidationError::CapacityOutOfRange {
                field,
                value,
                max: MAX_STORE_CAPACITY,
            });
        }
    }

    if config
        .observability
        .log_level
        .parse::<tracing::Level>()
        .is_err()
    {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CaptureConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = CaptureConfig::default();
        config.max_log_number = 0;
        config.max_network_number = MAX_STORE_CAPACITY + 1;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::UnknownLogLevel("loud".into())));
        assert_eq!(
            errors[0].to_string(),
            "max_log_number must be between 1 and 1000000, got 0"
        );
    }
}
