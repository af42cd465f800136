// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn is_zero(value: &i32) -> bool {
    *value == 0
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "TidbConfig",
    group = "tidb",
    version = "v1alpha1",
    plural = "tidbconfigs",
    status = "TidbConfigStatus",
    doc = "TidbConfig holds the configuration of a TiDB cluster.",
    derive = "PartialEq",
    derive = "Default",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TidbConfigSpec {
    /// Number of TiDB replicas
    #[serde(default, skip_serializing_if = "is_zero")]
    pub replicas: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TidbConfigStatus {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_replicas: i32,
}
