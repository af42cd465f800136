// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Versioned object storage on top of an [`EntryBackend`].
//!
//! Every object lives in one backend entry named after its key and tagged
//! with the key's labels. Entry versions double as object resource versions.

pub mod update;
pub mod watch;

use std::marker::PhantomData;
use std::sync::Arc;

use kube::Client;
use once_cell::sync::Lazy;

use aba_common::config::{StorageConfig, WatchConfig};
use aba_common::constant::domain_key;
use aba_common::telemetry::{debug, info, warn};

use crate::api::{ObjectList, StoredObject};
use crate::backend::configmap::ConfigMapBackend;
use crate::backend::{DeletePreconditions, Entry, EntryBackend, EntryList, SelectorExt};
use crate::codec::Codec;
use crate::error::{BackendError, Result, StorageError};
use crate::key::{KeyPrefix, ObjectKey, NAMESPACE_LABEL, NAME_LABEL};
use crate::predicate::SelectionPredicate;
use crate::versioner::{ObjectVersioner, Preconditions};

pub static TTL_ANNOTATION: Lazy<String> = Lazy::new(|| domain_key("ttl"));

/// Decode an entry payload and stamp what the entry owns onto the result:
/// uid, version and TTL annotation. Name and namespace missing from the
/// payload are taken from the key labels.
pub(crate) fn decode_entry<K: StoredObject>(codec: &Codec, versioner: &ObjectVersioner, entry: &Entry) -> Result<K> {
    let mut object: K = codec.decode(&entry.name, &entry.payload)?;

    let meta = object.meta_mut();
    meta.uid = entry.uid.clone();
    if meta.name.is_none() {
        meta.name = entry.labels.get(NAME_LABEL.as_str()).cloned();
    }
    if meta.namespace.is_none() {
        meta.namespace = entry.labels.get(NAMESPACE_LABEL.as_str()).cloned();
    }
    if let Some(ttl) = entry.annotations.get(TTL_ANNOTATION.as_str()) {
        meta.annotations
            .get_or_insert_with(Default::default)
            .insert(TTL_ANNOTATION.to_string(), ttl.clone());
    }

    versioner.stamp(&mut object, &entry.name, entry.resource_version.as_deref())?;
    Ok(object)
}

pub(crate) fn entry_ttl(entry: &Entry) -> Option<u64> {
    entry.annotations.get(TTL_ANNOTATION.as_str()).and_then(|ttl| ttl.parse().ok())
}

/// TTL of an object read from the store
pub fn object_ttl<K: StoredObject>(object: &K) -> Option<u64> {
    object
        .meta()
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(TTL_ANNOTATION.as_str()))
        .and_then(|ttl| ttl.parse().ok())
}

pub struct EntryStore<K> {
    backend: Arc<dyn EntryBackend>,
    codec: Codec,
    versioner: ObjectVersioner,
    max_update_retries: u32,
    watch: WatchConfig,
    _object: PhantomData<fn() -> K>,
}

impl<K> Clone for EntryStore<K> {
    fn clone(&self) -> Self {
        EntryStore {
            backend: self.backend.clone(),
            codec: self.codec,
            versioner: self.versioner,
            max_update_retries: self.max_update_retries,
            watch: self.watch.clone(),
            _object: PhantomData,
        }
    }
}

impl<K: StoredObject> EntryStore<K> {
    pub fn new(backend: Arc<dyn EntryBackend>, config: &StorageConfig) -> Self {
        EntryStore {
            backend,
            codec: Codec::new(config.codec),
            versioner: ObjectVersioner::new(config.strict_versioning),
            max_update_retries: config.max_update_retries,
            watch: config.watch.clone(),
            _object: PhantomData,
        }
    }

    /// Store keeping entries as ConfigMaps in `config.namespace`
    pub fn with_config_maps(client: Client, config: &StorageConfig) -> Self {
        Self::new(Arc::new(ConfigMapBackend::new(client, &config.namespace)), config)
    }

    pub fn backend(&self) -> &Arc<dyn EntryBackend> {
        &self.backend
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn versioner(&self) -> &ObjectVersioner {
        &self.versioner
    }

    pub(crate) fn decode(&self, entry: &Entry) -> Result<K> {
        decode_entry(&self.codec, &self.versioner, entry)
    }

    /// Build the entry holding `object`. The payload never carries the
    /// backend owned uid, version and TTL; `ttl` alone decides the latter.
    pub(crate) fn encode(&self, key: &ObjectKey, object: &K, ttl: Option<u64>) -> Result<Entry> {
        let mut object = object.clone();
        self.versioner.prepare_object_for_storage(&mut object);

        let meta = object.meta_mut();
        meta.uid = None;
        if let Some(annotations) = meta.annotations.as_mut() {
            annotations.remove(TTL_ANNOTATION.as_str());
            if annotations.is_empty() {
                meta.annotations = None;
            }
        }

        let entry = Entry::new(key.full_name(), key.labels(), self.codec.encode(&object)?);
        Ok(match ttl {
            Some(ttl) => entry.with_annotation(TTL_ANNOTATION.as_str(), ttl.to_string()),
            None => entry,
        })
    }

    /// Read the entry of a key. Keys differing only in case share an entry
    /// name, so the labels have to agree as well.
    pub(crate) async fn get_entry(&self, key: &ObjectKey) -> Result<Option<Entry>> {
        let entry = self
            .backend
            .get(key.full_name())
            .await
            .map_err(|e| StorageError::from_backend(&key.to_string(), e))?;

        Ok(entry.filter(|entry| key.selector().matches(&entry.labels)))
    }

    fn list_version(&self, list: &EntryList) -> Result<u64> {
        match self.versioner.parse_resource_version(list.resource_version.as_deref().unwrap_or_default()) {
            Ok(version) => Ok(version),
            Err(err) if self.versioner.is_strict() => Err(err),
            Err(err) => {
                warn!(event = "ListVersionSkipped", backend = self.backend.name(), error = %err);
                Ok(0)
            }
        }
    }

    /// Create a new object under `key`
    ///
    /// # Arguments
    /// * `key` - The key of the new object
    /// * `object` - The object to store, without a resource version
    /// * `ttl` - Optional time to live in seconds, recorded on the entry
    ///
    /// # Returns
    /// The stored object carrying its assigned resource version
    pub async fn create(&self, key: &str, object: &K, ttl: Option<u64>) -> Result<K> {
        let object_key = ObjectKey::parse(key)?;

        match self.versioner.object_resource_version(object) {
            Ok(0) => (),
            Ok(_) => {
                return Err(StorageError::VersionConflict {
                    key: key.to_string(),
                    message: "resourceVersion should not be set on objects to be created".to_string(),
                })
            }
            Err(err) if self.versioner.is_strict() => return Err(err),
            Err(err) => warn!(event = "CreateVersionIgnored", key = key, error = %err),
        }

        let entry = self.encode(&object_key, object, ttl)?;
        let created = self
            .backend
            .create(entry)
            .await
            .map_err(|e| StorageError::from_backend(key, e))?;

        info!(
            event = "ObjectCreated",
            key = key,
            resource_version = created.resource_version.as_deref().unwrap_or_default()
        );
        self.decode(&created)
    }

    /// Read the object stored under `key`
    ///
    /// A missing key yields `K::default()` when `ignore_not_found` is set,
    /// `NotFound` otherwise. `resource_version` only has to be well formed,
    /// every read observes the latest state.
    pub async fn get(&self, key: &str, resource_version: &str, ignore_not_found: bool) -> Result<K> {
        let object_key = ObjectKey::parse(key)?;
        self.versioner.parse_resource_version(resource_version)?;

        match self.get_entry(&object_key).await? {
            Some(entry) => self.decode(&entry),
            None if ignore_not_found => Ok(K::default()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    /// Delete the object stored under `key`, returning its last state
    pub async fn delete(&self, key: &str, preconditions: Option<&Preconditions>) -> Result<K> {
        let object_key = ObjectKey::parse(key)?;

        for attempt in 0..=self.max_update_retries {
            let entry = self
                .get_entry(&object_key)
                .await?
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            let current = self.decode(&entry)?;
            if let Some(preconditions) = preconditions {
                preconditions.check(key, &current)?;
            }

            // the backend re-checks that nothing changed since the read
            let guard = DeletePreconditions {
                resource_version: entry.resource_version.clone(),
                uid: entry.uid.clone(),
            };
            match self.backend.delete(&entry.name, &guard).await {
                Ok(_) => {
                    info!(event = "ObjectDeleted", key = key);
                    return Ok(current);
                }
                // a concurrent delete shows up as NotFound on the next read
                Err(BackendError::Conflict(_) | BackendError::NotFound(_)) => {
                    debug!(event = "DeleteConflict", key = key, attempt = attempt);
                }
                Err(err) => return Err(StorageError::from_backend(key, err)),
            }
        }

        Err(StorageError::VersionConflict {
            key: key.to_string(),
            message: format!("entry kept changing, gave up after {} retries", self.max_update_retries),
        })
    }

    /// Point lookup of `key` expressed as a list, filtered by `predicate`
    pub async fn get_to_list(
        &self,
        key: &str,
        resource_version: &str,
        predicate: &SelectionPredicate<K>,
    ) -> Result<ObjectList<K>> {
        let object_key = ObjectKey::parse(key)?;
        self.versioner.parse_resource_version(resource_version)?;

        let entries = self
            .backend
            .list(&object_key.selector())
            .await
            .map_err(|e| StorageError::from_backend(key, e))?;

        let mut list = ObjectList::default();
        for entry in &entries.items {
            let object = self.decode(entry)?;
            if predicate.matches(&object) {
                list.items.push(object);
            }
        }
        self.versioner.update_list(&mut list, self.list_version(&entries)?);
        Ok(list)
    }

    /// List every object under `prefix` matching `predicate`
    ///
    /// Entries that fail to decode are logged and skipped.
    pub async fn list(
        &self,
        prefix: &str,
        resource_version: &str,
        predicate: &SelectionPredicate<K>,
    ) -> Result<ObjectList<K>> {
        let key_prefix = KeyPrefix::parse(prefix)?;
        self.versioner.parse_resource_version(resource_version)?;

        let entries = self
            .backend
            .list(&key_prefix.selector())
            .await
            .map_err(|e| StorageError::from_backend(prefix, e))?;

        let mut list = ObjectList::default();
        let mut skipped = 0;
        for entry in &entries.items {
            match self.decode(entry) {
                Ok(object) if predicate.matches(&object) => list.items.push(object),
                Ok(_) => (),
                Err(err) => {
                    skipped += 1;
                    warn!(event = "EntrySkipped", prefix = prefix, entry = entry.name.as_str(), error = %err);
                }
            }
        }
        self.versioner.update_list(&mut list, self.list_version(&entries)?);

        debug!(
            event = "ObjectsListed",
            prefix = prefix,
            listed = entries.items.len(),
            matched = list.len(),
            skipped = skipped
        );
        Ok(list)
    }

    /// Number of entries under `prefix`
    pub async fn count(&self, prefix: &str) -> Result<usize> {
        let key_prefix = KeyPrefix::parse(prefix)?;
        let entries = self
            .backend
            .list(&key_prefix.selector())
            .await
            .map_err(|e| StorageError::from_backend(prefix, e))?;
        Ok(entries.items.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::api::v1alpha1::tidb_config::{TidbConfig, TidbConfigSpec};
    use crate::backend::memory::MemoryBackend;

    use super::*;

    fn store() -> EntryStore<TidbConfig> {
        EntryStore::new(Arc::new(MemoryBackend::new()), &StorageConfig::default())
    }

    #[tokio::test]
    async fn test_payload_has_no_version() {
        let store = store();
        let key = ObjectKey::parse("/tidb/config/default/cluster1").expect("valid key");
        let mut object = TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 });
        object.metadata.resource_version = Some("9".to_string());

        let entry = store.encode(&key, &object, Some(30)).expect("encoded");
        let payload: serde_json::Value = serde_json::from_slice(&entry.payload).expect("json");

        assert_eq!(entry.name, "tidb-config-default-cluster1");
        assert!(payload["metadata"].get("resourceVersion").is_none());
        assert_eq!(entry_ttl(&entry), Some(30));
    }

    #[tokio::test]
    async fn test_case_folded_names_do_not_alias() {
        let store = store();
        let object = TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 });
        store
            .create("/tidb/config/default/Cluster1", &object, None)
            .await
            .expect("created");

        let err = store
            .get("/tidb/config/default/cluster1", "", false)
            .await
            .expect_err("different key");
        assert!(err.is_not_found());
        assert!(store
            .create("/tidb/config/default/cluster1", &object, None)
            .await
            .expect_err("entry name taken")
            .is_already_exists());
    }

    #[tokio::test]
    async fn test_key_fills_missing_name_and_namespace() {
        let store = store();
        let mut object = TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 });
        object.metadata.name = None;
        store
            .create("/tidb/config/prod/cluster1", &object, None)
            .await
            .expect("created");

        let read = store.get("/tidb/config/prod/cluster1", "", false).await.expect("found");
        assert_eq!(read.metadata.name.as_deref(), Some("cluster1"));
        assert_eq!(read.metadata.namespace.as_deref(), Some("prod"));

        let predicate = SelectionPredicate::parse("", "metadata.namespace=prod,metadata.name=cluster1")
            .expect("valid selector");
        let list = store.list("/tidb/config", "", &predicate).await.expect("listed");
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_lives_on_the_entry() {
        let store = store();
        let key = ObjectKey::parse("/tidb/config/default/cluster1").expect("valid key");
        let created = store
            .create(&key.to_string(), &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), Some(30))
            .await
            .expect("created");
        assert_eq!(object_ttl(&created), Some(30));

        // a stale annotation on the object never reaches the entry
        let entry = store.encode(&key, &created, None).expect("encoded");
        assert_eq!(entry_ttl(&entry), None);
        assert!(entry.annotations.is_empty());
        let payload: serde_json::Value = serde_json::from_slice(&entry.payload).expect("json");
        assert!(payload["metadata"].get("annotations").is_none());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let store = store();
        assert!(matches!(
            store.get("/tidb/config", "", false).await,
            Err(StorageError::MalformedKey(_))
        ));
        assert!(matches!(
            store.get("/tidb/config/default/cluster1", "abc", true).await,
            Err(StorageError::InvalidResourceVersion(_))
        ));
        assert!(matches!(
            store.count("/tidb").await,
            Err(StorageError::MalformedKey(_))
        ));
    }
}
