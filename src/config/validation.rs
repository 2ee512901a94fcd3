//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate account ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.shutdown_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "server.max_body_bytes",
            "must be greater than zero",
        ));
    }

    if let Err(e) = url::Url::parse(&config.upstream.api_base) {
        errors.push(ValidationError::new(
            "upstream.api_base",
            format!("invalid URL: {}", e),
        ));
    }
    if config.upstream.token_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.token_ttl_secs",
            "must be greater than zero",
        ));
    }

    if config.logging.log_in_file {
        if config.logging.access_log_path.is_empty() {
            errors.push(ValidationError::new(
                "logging.access_log_path",
                "required when log_in_file is enabled",
            ));
        }
        if config.logging.error_log_path.is_empty() {
            errors.push(ValidationError::new(
                "logging.error_log_path",
                "required when log_in_file is enabled",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for account in &config.accounts {
        if !seen.insert(account.id) {
            errors.push(ValidationError::new(
                "accounts",
                format!("duplicate account id {}", account.id),
            ));
        }
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
    use crate::config::schema::AccountRecord;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.server.shutdown_timeout_secs = 0;
        config.upstream.api_base = "::".into();
        for _ in 0..2 {
            config.accounts.push(AccountRecord {
                id: 1,
                app_id: "wx1".into(),
                app_secret: "s1".into(),
                state: 1,
            });
        }

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "server.shutdown_timeout_secs",
                "upstream.api_base",
                "accounts"
            ]
        );
    }

    #[test]
    fn file_logging_needs_paths() {
        let mut config = GatewayConfig::default();
        config.logging.log_in_file = true;
        config.logging.error_log_path.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "logging.error_log_path");
    }
}
