// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Structured storage keys.
//!
//! Objects are addressed as `/{group}/{kind}/{namespace}/{name}`. The backend
//! can not address entries by path, so every key maps to a flat entry name
//! (the segments lower-cased and joined by `-`) plus a label set that is used
//! both to tag new entries and to select them again.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use kube::Resource;
use once_cell::sync::Lazy;

use aba_common::constant::domain_key;

use crate::backend::Selector;
use crate::error::{Result, StorageError};

pub static GROUP_LABEL: Lazy<String> = Lazy::new(|| domain_key("group"));
pub static KIND_LABEL: Lazy<String> = Lazy::new(|| domain_key("kind"));
pub static NAMESPACE_LABEL: Lazy<String> = Lazy::new(|| domain_key("namespace"));
pub static NAME_LABEL: Lazy<String> = Lazy::new(|| domain_key("name"));

/// Splits a key into its non-empty segments, accepting between `min` and 4 of them
fn split_segments(key: &str, min: usize) -> Result<Vec<&str>> {
    let trimmed = key.strip_prefix('/').unwrap_or(key);
    let segments: Vec<&str> = trimmed.split('/').collect();

    if segments.len() < min || segments.len() > 4 || segments.iter().any(|s| s.is_empty()) {
        return Err(StorageError::MalformedKey(key.to_string()));
    }
    Ok(segments)
}

/// Key of a single object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    group: String,
    kind: String,
    namespace: String,
    name: String,
    full_name: String,
}

impl ObjectKey {
    pub fn parse(key: &str) -> Result<Self> {
        let segments = split_segments(key, 4)?;
        if segments.len() != 4 {
            return Err(StorageError::MalformedKey(key.to_string()));
        }

        Ok(ObjectKey {
            group: segments[0].to_string(),
            kind: segments[1].to_string(),
            namespace: segments[2].to_string(),
            name: segments[3].to_string(),
            full_name: segments.join("-").to_lowercase(),
        })
    }

    /// Key of a typed object, `/{group}/{plural}/{namespace}/{name}`. Objects
    /// without a namespace land in `default`.
    pub fn for_object<K: Resource<DynamicType = ()>>(object: &K) -> Result<Self> {
        let meta = object.meta();
        Self::parse(&format!(
            "/{}/{}/{}/{}",
            K::group(&()),
            K::plural(&()),
            meta.namespace.as_deref().unwrap_or("default"),
            meta.name.as_deref().unwrap_or_default()
        ))
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical backend identifier of the entry holding this object
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (GROUP_LABEL.to_string(), self.group.clone()),
            (KIND_LABEL.to_string(), self.kind.clone()),
            (NAMESPACE_LABEL.to_string(), self.namespace.clone()),
            (NAME_LABEL.to_string(), self.name.clone()),
        ])
    }

    /// Selector matching exactly the entry of this key
    pub fn selector(&self) -> Selector {
        Selector::from_iter(self.labels())
    }

    pub fn prefix(&self) -> KeyPrefix {
        KeyPrefix {
            group: self.group.clone(),
            kind: self.kind.clone(),
            namespace: Some(self.namespace.clone()),
            name: Some(self.name.clone()),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectKey::parse(s)
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "/{}/{}/{}/{}", self.group, self.kind, self.namespace, self.name)
    }
}

/// Key addressing a set of objects: every object of a kind, every object of
/// a kind in one namespace, or a single object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix {
    group: String,
    kind: String,
    namespace: Option<String>,
    name: Option<String>,
}

impl KeyPrefix {
    pub fn parse(key: &str) -> Result<Self> {
        // a trailing slash is how directory-like prefixes are usually spelled
        let trimmed = key.strip_suffix('/').unwrap_or(key);
        let segments = split_segments(trimmed, 2).map_err(|_| StorageError::MalformedKey(key.to_string()))?;

        Ok(KeyPrefix {
            group: segments[0].to_string(),
            kind: segments[1].to_string(),
            namespace: segments.get(2).map(|s| s.to_string()),
            name: segments.get(3).map(|s| s.to_string()),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (GROUP_LABEL.to_string(), self.group.clone()),
            (KIND_LABEL.to_string(), self.kind.clone()),
        ])
        .into_iter()
        .chain(self.namespace.clone().map(|ns| (NAMESPACE_LABEL.to_string(), ns)))
        .chain(self.name.clone().map(|name| (NAME_LABEL.to_string(), name)))
        .collect()
    }

    pub fn selector(&self) -> Selector {
        Selector::from_iter(self.labels())
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.group == key.group
            && self.kind == key.kind
            && self.namespace.as_ref().is_none_or(|ns| *ns == key.namespace)
            && self.name.as_ref().is_none_or(|name| *name == key.name)
    }
}

impl FromStr for KeyPrefix {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        KeyPrefix::parse(s)
    }
}

impl From<ObjectKey> for KeyPrefix {
    fn from(key: ObjectKey) -> Self {
        key.prefix()
    }
}

impl Display for KeyPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "/{}/{}", self.group, self.kind)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "/{}", namespace)?;
        }
        if let Some(name) = &self.name {
            write!(f, "/{}", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aba_common::constant::LABEL_DOMAIN;

    use super::*;

    #[test]
    fn test_parse_object_key() {
        let key = ObjectKey::parse("/tidb/Config/default/Cluster1").expect("valid key");

        assert_eq!(key.group(), "tidb");
        assert_eq!(key.kind(), "Config");
        assert_eq!(key.namespace(), "default");
        assert_eq!(key.name(), "Cluster1");
        assert_eq!(key.full_name(), "tidb-config-default-cluster1");
        assert_eq!(key.to_string(), "/tidb/Config/default/Cluster1");
    }

    #[test]
    fn test_parse_round_trips_segments() {
        for raw in [
            "/tidb/config/default/cluster1",
            "/apps.pingcap.com/TidbCluster/prod/a-b.c",
            "tidb/config/kube-system/x",
        ] {
            let key: ObjectKey = raw.parse().expect("valid key");
            let again = ObjectKey::parse(&key.to_string()).expect("formatted key parses");
            assert_eq!(key, again);
        }
    }

    #[test]
    fn test_malformed_object_keys() {
        for raw in [
            "",
            "/",
            "/tidb",
            "/tidb/config/default",
            "/tidb/config/default/cluster1/extra",
            "/tidb//default/cluster1",
            "/tidb/config/default/",
            "//tidb/config/default/cluster1",
        ] {
            assert!(
                matches!(ObjectKey::parse(raw), Err(StorageError::MalformedKey(k)) if k == raw),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_key_for_object() {
        use crate::api::v1alpha1::tidb_config::{TidbConfig, TidbConfigSpec};

        let mut object = TidbConfig::new("cluster1", TidbConfigSpec { replicas: 1 });
        assert_eq!(
            ObjectKey::for_object(&object).expect("valid key").to_string(),
            "/tidb/tidbconfigs/default/cluster1"
        );

        object.metadata.namespace = Some("prod".to_string());
        assert_eq!(ObjectKey::for_object(&object).expect("valid key").namespace(), "prod");

        assert!(ObjectKey::for_object(&TidbConfig::default()).is_err());
    }

    #[test]
    fn test_labels() {
        let key = ObjectKey::parse("/tidb/config/default/cluster1").expect("valid key");
        let labels = key.labels();

        assert_eq!(labels.len(), 4);
        assert_eq!(labels["aba.pingcap.com/group"], "tidb");
        assert_eq!(labels[KIND_LABEL.as_str()], "config");
        assert_eq!(labels[NAMESPACE_LABEL.as_str()], "default");
        assert_eq!(labels[NAME_LABEL.as_str()], "cluster1");
        assert!(labels.keys().all(|k| k.starts_with(&format!("{}/", LABEL_DOMAIN))));
    }

    #[test]
    fn test_parse_prefix() {
        let all = KeyPrefix::parse("/tidb/config").expect("kind prefix");
        assert_eq!(all.namespace(), None);
        assert_eq!(all.labels().len(), 2);

        let namespaced = KeyPrefix::parse("/tidb/config/default/").expect("namespace prefix");
        assert_eq!(namespaced.namespace(), Some("default"));
        assert_eq!(namespaced.name(), None);
        assert_eq!(namespaced.labels().len(), 3);
        assert_eq!(namespaced.to_string(), "/tidb/config/default");

        let single = KeyPrefix::parse("/tidb/config/default/cluster1").expect("object prefix");
        assert_eq!(single.labels().len(), 4);

        assert!(KeyPrefix::parse("/tidb").is_err());
        assert!(KeyPrefix::parse("/tidb//default").is_err());
        assert!(KeyPrefix::parse("/a/b/c/d/e").is_err());
    }

    #[test]
    fn test_prefix_contains() {
        let key = ObjectKey::parse("/tidb/config/default/cluster1").expect("valid key");

        assert!(KeyPrefix::parse("/tidb/config").expect("prefix").contains(&key));
        assert!(KeyPrefix::parse("/tidb/config/default").expect("prefix").contains(&key));
        assert!(key.prefix().contains(&key));
        assert!(!KeyPrefix::parse("/tidb/config/other").expect("prefix").contains(&key));
        assert!(!KeyPrefix::parse("/tidb/secret").expect("prefix").contains(&key));
    }
}
