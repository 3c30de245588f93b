//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, ranges and name uniqueness
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use axum::http::Uri;
use thiserror::Error;

use crate::config::schema::{DependencyKind, SamplingPolicy, ServiceConfig};
use crate::net::parse_listen_addr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid address {value:?}")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: String },

    #[error("health: initial_backoff_ms ({initial}) exceeds max_backoff_ms ({max})")]
    BackoffRange { initial: u64, max: u64 },

    #[error("observability.sample_probability must be within [0, 1], got {0}")]
    Probability(String),

    #[error("health.dependencies: duplicate name {0:?}")]
    DuplicateDependency(String),

    #[error("server.tls: {0} must not be empty")]
    EmptyTlsPath(&'static str),
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if parse_listen_addr(&config.server.bind_address).is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "server.bind_address".into(),
            value: config.server.bind_address.clone(),
        });
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "server.request_timeout_secs".into(),
        });
    }
    if let Some(tls) = &config.server.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    let health = &config.health;
    if health.initial_backoff_ms == 0 {
        errors.push(ValidationError::Zero {
            field: "health.initial_backoff_ms".into(),
        });
    }
    if health.initial_backoff_ms > health.max_backoff_ms {
        errors.push(ValidationError::BackoffRange {
            initial: health.initial_backoff_ms,
            max: health.max_backoff_ms,
        });
    }

    let mut names = HashSet::new();
    for (i, dep) in health.dependencies.iter().enumerate() {
        if !names.insert(dep.name.as_str()) {
            errors.push(ValidationError::DuplicateDependency(dep.name.clone()));
        }
        let valid = match dep.kind {
            DependencyKind::Tcp => dep.address.rsplit_once(':').is_some_and(|(host, port)| {
                !host.is_empty() && port.parse::<u16>().is_ok()
            }),
            DependencyKind::Http => dep
                .address
                .parse::<Uri>()
                .is_ok_and(|uri| uri.scheme_str() == Some("http") && uri.authority().is_some()),
        };
        if !valid {
            errors.push(ValidationError::InvalidAddress {
                field: format!("health.dependencies[{i}].address"),
                value: dep.address.clone(),
            });
        }
        if dep.timeout_ms == 0 {
            errors.push(ValidationError::Zero {
                field: format!("health.dependencies[{i}].timeout_ms"),
            });
        }
    }

    let obs = &config.observability;
    if obs.sampling == SamplingPolicy::Probability
        && !(0.0..=1.0).contains(&obs.sample_probability)
    {
        errors.push(ValidationError::Probability(obs.sample_probability.to_string()));
    }
    if obs.metrics_enabled && parse_listen_addr(&obs.metrics_address).is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address".into(),
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
