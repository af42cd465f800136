// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use aba_common::telemetry::{debug, info};

use crate::api::StoredObject;
use crate::error::{BackendError, Result, StorageError};
use crate::key::ObjectKey;
use crate::store::{entry_ttl, object_ttl, EntryStore};
use crate::versioner::{Preconditions, ResponseMeta};

/// What an update attempt starts from
struct UpdateState<K> {
    object: K,
    meta: ResponseMeta,
    /// `object` encoded the way a write would encode it, used to detect
    /// updates that change nothing
    payload: Vec<u8>,
    /// Version the write has to replace, `None` when the entry does not exist
    entry_version: Option<String>,
}

impl<K> UpdateState<K> {
    fn exists(&self) -> bool {
        self.entry_version.is_some()
    }
}

impl<K: StoredObject> EntryStore<K> {
    async fn current_state(&self, key: &ObjectKey, ignore_not_found: bool) -> Result<UpdateState<K>> {
        match self.get_entry(key).await? {
            Some(entry) => {
                let object = self.decode(&entry)?;
                let ttl = entry_ttl(&entry);
                Ok(UpdateState {
                    meta: ResponseMeta {
                        ttl,
                        resource_version: self.versioner.object_resource_version(&object)?,
                    },
                    payload: self.encode(key, &object, ttl)?.payload,
                    entry_version: entry.resource_version,
                    object,
                })
            }
            None if ignore_not_found => {
                let object = K::default();
                Ok(UpdateState {
                    payload: self.encode(key, &object, None)?.payload,
                    meta: ResponseMeta::default(),
                    entry_version: None,
                    object,
                })
            }
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    /// State of an object previously read from the store, which carries the
    /// TTL its entry had at that version
    fn suggested_state(&self, key: &ObjectKey, object: K) -> Result<Option<UpdateState<K>>> {
        let version = self.versioner.object_resource_version(&object).unwrap_or_default();
        if version == 0 {
            return Ok(None);
        }
        let ttl = object_ttl(&object);
        Ok(Some(UpdateState {
            payload: self.encode(key, &object, ttl)?.payload,
            meta: ResponseMeta {
                ttl,
                resource_version: version,
            },
            entry_version: Some(version.to_string()),
            object,
        }))
    }

    /// Read-modify-write the object under `key` with optimistic concurrency
    ///
    /// `try_update` receives the current object and returns the desired one
    /// plus an optional TTL override. It runs again on every conflict, at most
    /// `max_update_retries` extra times.
    ///
    /// # Arguments
    /// * `key` - The key of the object
    /// * `ignore_not_found` - Update `K::default()` and create the object when the key is missing
    /// * `preconditions` - Checked against the current object before every attempt
    /// * `try_update` - The update function
    /// * `suggestion` - A recently read object used instead of the first read
    ///
    /// # Returns
    /// The stored object, unchanged and unwritten when the update was a no-op
    pub async fn guaranteed_update<F>(
        &self,
        key: &str,
        ignore_not_found: bool,
        preconditions: Option<&Preconditions>,
        mut try_update: F,
        suggestion: Option<K>,
    ) -> Result<K>
    where
        F: FnMut(K, &ResponseMeta) -> anyhow::Result<(K, Option<u64>)> + Send,
    {
        let object_key = ObjectKey::parse(key)?;

        let suggested = match suggestion {
            Some(object) => self.suggested_state(&object_key, object)?,
            None => None,
        };
        let mut state_is_current = suggested.is_none();
        let mut state = match suggested {
            Some(state) => state,
            None => self.current_state(&object_key, ignore_not_found).await?,
        };
        let mut conflicts = 0;

        loop {
            if let Some(preconditions) = preconditions {
                if let Err(err) = preconditions.check(key, &state.object) {
                    if state_is_current {
                        return Err(err);
                    }
                    state = self.current_state(&object_key, ignore_not_found).await?;
                    state_is_current = true;
                    continue;
                }
            }

            let (updated, ttl) = match try_update(state.object.clone(), &state.meta) {
                Ok(result) => result,
                Err(_) if !state_is_current => {
                    state = self.current_state(&object_key, ignore_not_found).await?;
                    state_is_current = true;
                    continue;
                }
                Err(err) => return Err(StorageError::UpdateFunc(err)),
            };

            let ttl = ttl.or(state.meta.ttl);
            let entry = self.encode(&object_key, &updated, ttl)?;
            if entry.payload == state.payload && ttl == state.meta.ttl {
                if !state_is_current {
                    state = self.current_state(&object_key, ignore_not_found).await?;
                    state_is_current = true;
                    continue;
                }
                debug!(event = "UpdateSkipped", key = key);
                return Ok(state.object);
            }

            let written = if state.exists() {
                self.backend
                    .replace(entry.with_resource_version(state.entry_version.clone()))
                    .await
            } else {
                self.backend.create(entry).await
            };

            match written {
                Ok(written) => {
                    info!(
                        event = "ObjectUpdated",
                        key = key,
                        resource_version = written.resource_version.as_deref().unwrap_or_default(),
                        conflicts = conflicts
                    );
                    return self.decode(&written);
                }
                // the entry changed, appeared or vanished since it was read
                Err(BackendError::Conflict(_) | BackendError::AlreadyExists(_) | BackendError::NotFound(_)) => {
                    conflicts += 1;
                    if conflicts > self.max_update_retries {
                        return Err(StorageError::VersionConflict {
                            key: key.to_string(),
                            message: format!("gave up after {} retries", self.max_update_retries),
                        });
                    }
                    debug!(event = "UpdateConflict", key = key, attempt = conflicts);
                    state = self.current_state(&object_key, ignore_not_found).await?;
                    state_is_current = true;
                }
                Err(err) => return Err(StorageError::from_backend(key, err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aba_common::config::StorageConfig;

    use crate::api::v1alpha1::tidb_config::{TidbConfig, TidbConfigSpec};
    use crate::backend::memory::MemoryBackend;
    use crate::backend::EntryBackend;

    use super::*;

    static KEY: &str = "/tidb/config/default/cluster1";

    fn store() -> (Arc<MemoryBackend>, EntryStore<TidbConfig>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = EntryStore::new(backend.clone() as Arc<dyn EntryBackend>, &StorageConfig::default());
        (backend, store)
    }

    #[tokio::test]
    async fn test_noop_update_does_not_write() {
        let (backend, store) = store();
        store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), None)
            .await
            .expect("created");

        let result = store
            .guaranteed_update(KEY, false, None, |current, _| Ok((current, None)), None)
            .await
            .expect("no-op");

        assert_eq!(result.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(backend.revision().await, 1);
    }

    #[tokio::test]
    async fn test_stale_suggestion_is_refreshed() {
        let (_, store) = store();
        let created = store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), None)
            .await
            .expect("created");
        store
            .guaranteed_update(
                KEY,
                false,
                None,
                |mut current, _| {
                    current.spec.replicas = 5;
                    Ok((current, None))
                },
                None,
            )
            .await
            .expect("updated");

        let mut seen = Vec::new();
        let result = store
            .guaranteed_update(
                KEY,
                false,
                None,
                |mut current, meta| {
                    seen.push(meta.resource_version);
                    current.spec.replicas += 1;
                    Ok((current, None))
                },
                Some(created),
            )
            .await
            .expect("updated");

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(result.spec.replicas, 6);
        assert_eq!(result.metadata.resource_version.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_update_function_error_is_reported() {
        let (_, store) = store();
        store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), None)
            .await
            .expect("created");

        let err = store
            .guaranteed_update(KEY, false, None, |_, _| Err(anyhow::anyhow!("replicas are frozen")), None)
            .await
            .expect_err("update refused");
        assert!(matches!(err, StorageError::UpdateFunc(_)));
    }

    #[tokio::test]
    async fn test_ttl_is_kept_and_overridden() {
        let (_, store) = store();
        store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), Some(60))
            .await
            .expect("created");

        let mut ttls = Vec::new();
        for (replicas, ttl) in [(4, None), (5, Some(10)), (6, None)] {
            store
                .guaranteed_update(
                    KEY,
                    false,
                    None,
                    |mut current, meta| {
                        ttls.push(meta.ttl);
                        current.spec.replicas = replicas;
                        Ok((current, ttl))
                    },
                    None,
                )
                .await
                .expect("updated");
        }
        assert_eq!(ttls, vec![Some(60), Some(60), Some(10)]);
    }

    #[tokio::test]
    async fn test_suggestion_keeps_ttl() {
        let (backend, store) = store();
        let created = store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), Some(60))
            .await
            .expect("created");
        assert_eq!(object_ttl(&created), Some(60));

        let mut ttls = Vec::new();
        let updated = store
            .guaranteed_update(
                KEY,
                false,
                None,
                |mut current, meta| {
                    ttls.push(meta.ttl);
                    current.spec.replicas = 4;
                    Ok((current, None))
                },
                Some(created),
            )
            .await
            .expect("updated");

        assert_eq!(ttls, vec![Some(60)]);
        assert_eq!(object_ttl(&updated), Some(60));
        let entry = backend
            .get("tidb-config-default-cluster1")
            .await
            .expect("get")
            .expect("entry");
        assert_eq!(entry_ttl(&entry), Some(60));
        assert!(!String::from_utf8_lossy(&entry.payload).contains("aba.pingcap.com/ttl"));
    }

    #[tokio::test]
    async fn test_stale_suggestion_picks_up_current_ttl() {
        let (_, store) = store();
        let created = store
            .create(KEY, &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 }), Some(60))
            .await
            .expect("created");
        store
            .guaranteed_update(KEY, false, None, |current, _| Ok((current, Some(10))), None)
            .await
            .expect("ttl changed");

        let mut ttls = Vec::new();
        let updated = store
            .guaranteed_update(
                KEY,
                false,
                None,
                |mut current, meta| {
                    ttls.push(meta.ttl);
                    current.spec.replicas = 4;
                    Ok((current, None))
                },
                Some(created),
            )
            .await
            .expect("updated");

        assert_eq!(ttls, vec![Some(60), Some(10)]);
        assert_eq!(object_ttl(&updated), Some(10));
    }
}
