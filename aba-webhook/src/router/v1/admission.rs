// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use axum::{
    extract::Extension,
    routing::post,
    Router,
    Json,
};
use std::sync::Arc;
use kube::core::{admission::{AdmissionRequest, AdmissionResponse, AdmissionReview}, DynamicObject};

use aba_common::state::State;
use aba_common::telemetry::{debug, info};

use crate::admission::tidb_config::validate_tidb_config_object;

pub fn router() -> Router {
    Router::new().route("/tidb/tidbconfig/validate", post(validate_tidb_config_endpoint))
}

pub async fn validate_tidb_config_endpoint(
    Extension(_state): Extension<Arc<State>>,
    payload: Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match payload.0.try_into() {
        Ok(request) => request,
        Err(err) => {
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };
    // Defaults to allow
    let mut response = AdmissionResponse::from(&request);

    // Deletes carry no object to check
    if let Some(object) = &request.object {
        match validate_tidb_config_object(object) {
            Ok(_) => debug!(event = "AdmissionAllowed", name = request.name.as_str()),
            Err(err) => {
                info!(event = "AdmissionDenied", name = request.name.as_str(), reason = %err);
                response = response.deny(err.to_string());
            }
        }
    }

    // Convert the response to a review and return it
    Json(response.into_review())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn review(object: Value) -> Json<AdmissionReview<DynamicObject>> {
        let review = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "tidb", "version": "v1alpha1", "kind": "TidbConfig"},
                "resource": {"group": "tidb", "version": "v1alpha1", "resource": "tidbconfigs"},
                "name": "cluster1",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": object,
                "dryRun": false
            }
        });
        Json(serde_json::from_value(review).expect("admission review"))
    }

    async fn answer(object: Value) -> Value {
        let Json(review) = validate_tidb_config_endpoint(Extension(Arc::new(State::default())), review(object)).await;
        serde_json::to_value(review).expect("serializable")["response"].clone()
    }

    #[tokio::test]
    async fn test_valid_object_is_allowed() {
        let response = answer(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbConfig",
            "metadata": {"name": "cluster1", "namespace": "default"},
            "spec": {"replicas": 3}
        }))
        .await;

        assert_eq!(response["allowed"], true);
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    }

    #[tokio::test]
    async fn test_invalid_object_is_denied() {
        let response = answer(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbConfig",
            "metadata": {"name": "cluster1"},
            "spec": {"replicas": -2}
        }))
        .await;

        assert_eq!(response["allowed"], false);
        let message = response["status"]["message"].as_str().unwrap_or_default();
        assert!(message.contains("spec.replicas"), "{}", message);
    }

    #[tokio::test]
    async fn test_wrong_kind_is_denied() {
        let response = answer(json!({
            "apiVersion": "tidb/v1alpha1",
            "kind": "TidbCluster",
            "metadata": {"name": "cluster1"}
        }))
        .await;

        assert_eq!(response["allowed"], false);
    }
}
