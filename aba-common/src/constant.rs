// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub const APP_NAME: &str = "aba-apiserver";
pub const ENV_PREFIX: &str = "ABA";

/// Domain every backend label and annotation is namespaced under.
pub const LABEL_DOMAIN: &str = "aba.pingcap.com";

/// Qualified label or annotation key, `{LABEL_DOMAIN}/{name}`
pub fn domain_key(name: &str) -> String {
    format!("{}/{}", LABEL_DOMAIN, name)
}
