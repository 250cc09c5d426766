//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check endpoint addresses and names
//! - Validate value ranges (limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SwitchyardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::SwitchyardConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener has no endpoints")]
    NoEndpoints,
    #[error("duplicate endpoint name '{0}'")]
    DuplicateEndpoint(String),
    #[error("endpoint '{name}' has invalid bind address '{address}'")]
    InvalidAddress { name: String, address: String },
    #[error("endpoint '{0}' enables TLS without any protocol version")]
    NoTlsProtocols(String),
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SwitchyardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    let mut names = HashSet::new();
    for endpoint in &config.listener.endpoints {
        if !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::DuplicateEndpoint(endpoint.name.clone()));
        }
        if endpoint.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                name: endpoint.name.clone(),
                address: endpoint.bind_address.clone(),
            });
        }
        if let Some(tls) = &endpoint.tls {
            if tls.protocols.is_empty() {
                errors.push(ValidationError::NoTlsProtocols(endpoint.name.clone()));
            }
        }
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroLimit("listener.max_connections"));
    }
    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::ZeroLimit("limits.max_header_bytes"));
    }
    if config.limits.max_headers == 0 {
        errors.push(ValidationError::ZeroLimit("limits.max_headers"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
