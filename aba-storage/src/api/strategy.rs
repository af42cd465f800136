// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Defaulting and validation applied to TidbConfig objects before they are
//! written.

use std::fmt::{Display, Formatter, Result as FmtResult};

use kube::ResourceExt;

use aba_common::telemetry::debug;

use crate::api::v1alpha1::tidb_config::TidbConfig;

/// A single invalid field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Set default field values
///
/// # Arguments
/// * `config` - The object to default in place
pub fn default_tidb_config(config: &mut TidbConfig) {
    if config.spec.replicas == 0 {
        config.spec.replicas = 1;
    }
    debug!(event = "DefaultedTidbConfig", name = config.name_any().as_str());
}

/// Check that a TidbConfig is well formed
///
/// # Arguments
/// * `config` - The object to validate
///
/// # Returns
/// Every invalid field, empty when the object is valid
pub fn validate_tidb_config(config: &TidbConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();

    match config.metadata.name.as_deref() {
        None | Some("") => errors.push(FieldError::new("metadata.name", "name is required")),
        // names end up as a key segment
        Some(name) if name.contains('/') => errors.push(FieldError::new("metadata.name", "name must not contain '/'")),
        Some(_) => (),
    }
    if config.metadata.namespace.as_deref().is_some_and(|ns| ns.contains('/')) {
        errors.push(FieldError::new("metadata.namespace", "namespace must not contain '/'"));
    }
    if config.spec.replicas < 0 {
        errors.push(FieldError::new("spec.replicas", "must be greater than or equal to 0"));
    }
    if config.status.as_ref().is_some_and(|s| s.current_replicas < 0) {
        errors.push(FieldError::new("status.currentReplicas", "must be greater than or equal to 0"));
    }

    debug!(event = "ValidatedTidbConfig", name = config.name_any().as_str(), errors = errors.len());
    errors
}
