// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use kube::core::DynamicObject;
use kube::Resource;

use aba_storage::api::strategy::{default_tidb_config, validate_tidb_config};
use aba_storage::api::v1alpha1::tidb_config::TidbConfig;

use crate::admission::error::{AdmissionError, AdmissionResult};

/// Check an admitted object the way the store would before writing it
///
/// # Arguments
/// * `payload` - The object of the admission request
///
/// # Returns
/// The defaulted object when it is valid
pub fn validate_tidb_config_object(payload: &DynamicObject) -> AdmissionResult<TidbConfig> {
    let kind = TidbConfig::kind(&()).to_string();
    let types = payload
        .types
        .as_ref()
        .ok_or_else(|| AdmissionError::MalformedObject("apiVersion and kind are required".to_string()))?;

    if types.kind != kind {
        return Err(AdmissionError::InvalidKind(types.kind.clone(), kind));
    }

    let version = types
        .api_version
        .split('/')
        .last()
        .unwrap_or(&types.api_version);
    if version != TidbConfig::version(&()) {
        return Err(AdmissionError::InvalidVersion(version.to_string(), kind));
    }

    let mut config: TidbConfig = serde_json::to_value(payload)
        .and_then(serde_json::from_value)
        .map_err(|e| AdmissionError::MalformedObject(e.to_string()))?;

    default_tidb_config(&mut config);
    let errors = validate_tidb_config(&config);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(AdmissionError::ValidationError(messages.join(", ")));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).expect("dynamic object")
    }

    #[test]
    fn test_defaulting_runs_before_validation() {
        let config = validate_tidb_config_object(&object(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbConfig",
            "metadata": {"name": "cluster1", "namespace": "default"},
            "spec": {}
        })))
        .expect("valid");

        assert_eq!(config.spec.replicas, 1);
    }

    #[test]
    fn test_errors_are_joined() {
        let err = validate_tidb_config_object(&object(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbConfig",
            "metadata": {"name": "a/b"},
            "spec": {"replicas": -1}
        })))
        .expect_err("invalid");

        assert_eq!(
            err.to_string(),
            "validation error: metadata.name: name must not contain '/', spec.replicas: must be greater than or equal to 0"
        );
    }

    #[test]
    fn test_kind_and_version_are_checked() {
        let err = validate_tidb_config_object(&object(json!({
            "apiVersion": "tidb/v1beta1",
            "kind": "TidbConfig",
            "metadata": {"name": "cluster1"}
        })))
        .expect_err("unknown version");
        assert!(matches!(err, AdmissionError::InvalidVersion(v, _) if v == "v1beta1"));

        let err = validate_tidb_config_object(&object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cluster1"}
        })))
        .expect_err("other kind");
        assert!(matches!(err, AdmissionError::InvalidKind(k, _) if k == "ConfigMap"));
    }

    #[test]
    fn test_malformed_spec() {
        let err = validate_tidb_config_object(&object(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbConfig",
            "metadata": {"name": "cluster1"},
            "spec": {"replicas": "three"}
        })))
        .expect_err("not a number");
        assert!(matches!(err, AdmissionError::MalformedObject(_)));
    }
}
