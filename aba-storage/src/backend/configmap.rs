// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use either::Either;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;
use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams, Preconditions},
    runtime::{watcher, WatchStreamExt},
    Client,
};

use aba_common::telemetry::debug;

use crate::backend::{
    BackendResult, DeletePreconditions, Entry, EntryBackend, EntryEvent, EntryEventStream, EntryList, Selector,
};
use crate::error::BackendError;

/// Key of the ConfigMap data item holding the serialized object
pub static PAYLOAD_KEY: &str = "value";

/// Create a new kube client by inferring the kubeconfig from the environment
/// or the default service account
///
/// # Returns
/// A Result containing the kube Client or an error
pub async fn create_k8s_client() -> BackendResult<Client> {
    Client::try_default().await.map_err(BackendError::from)
}

/// Backend keeping one ConfigMap per entry in a single namespace
#[derive(Clone)]
pub struct ConfigMapBackend {
    api: Api<ConfigMap>,
    namespace: String,
}

impl ConfigMapBackend {
    pub fn new(client: Client, namespace: &str) -> Self {
        ConfigMapBackend {
            api: Api::<ConfigMap>::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Convert an entry into the ConfigMap representing it
///
/// # Arguments
/// * `entry` - The entry to convert
///
/// # Returns
/// The ConfigMap, with the payload stored as text when it is valid UTF-8
pub fn entry_to_config_map(entry: Entry) -> ConfigMap {
    let (data, binary_data) = match String::from_utf8(entry.payload) {
        Ok(text) => (Some(BTreeMap::from([(PAYLOAD_KEY.to_string(), text)])), None),
        Err(err) => (
            None,
            Some(BTreeMap::from([(PAYLOAD_KEY.to_string(), ByteString(err.into_bytes()))])),
        ),
    };

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(entry.name),
            labels: Some(entry.labels),
            annotations: (!entry.annotations.is_empty()).then_some(entry.annotations),
            resource_version: entry.resource_version,
            uid: entry.uid,
            ..Default::default()
        },
        data,
        binary_data,
        ..Default::default()
    }
}

/// Convert a ConfigMap read from the cluster back into an entry
pub fn config_map_to_entry(config_map: ConfigMap) -> Entry {
    let payload = config_map
        .data
        .and_then(|mut data| data.remove(PAYLOAD_KEY))
        .map(String::into_bytes)
        .or_else(|| {
            config_map
                .binary_data
                .and_then(|mut data| data.remove(PAYLOAD_KEY))
                .map(|bytes| bytes.0)
        })
        .unwrap_or_default();

    Entry {
        name: config_map.metadata.name.unwrap_or_default(),
        labels: config_map.metadata.labels.unwrap_or_default(),
        annotations: config_map.metadata.annotations.unwrap_or_default(),
        payload,
        resource_version: config_map.metadata.resource_version,
        uid: config_map.metadata.uid,
    }
}

/// Map an API server failure onto the backend error taxonomy
fn classify(name: &str, error: kube::Error) -> BackendError {
    match &error {
        kube::Error::Api(response) if response.code == 404 => BackendError::NotFound(name.to_string()),
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            BackendError::AlreadyExists(name.to_string())
        }
        kube::Error::Api(response) if response.code == 409 => BackendError::Conflict(name.to_string()),
        _ => BackendError::Api(error),
    }
}

#[async_trait]
impl EntryBackend for ConfigMapBackend {
    fn name(&self) -> &str {
        "configmap"
    }

    async fn create(&self, entry: Entry) -> BackendResult<Entry> {
        let name = entry.name.clone();
        let config_map = entry_to_config_map(Entry { resource_version: None, uid: None, ..entry });
        self.api
            .create(&PostParams::default(), &config_map)
            .await
            .map(config_map_to_entry)
            .map_err(|e| classify(&name, e))
    }

    async fn get(&self, name: &str) -> BackendResult<Option<Entry>> {
        self.api
            .get_opt(name)
            .await
            .map(|config_map| config_map.map(config_map_to_entry))
            .map_err(|e| classify(name, e))
    }

    async fn replace(&self, entry: Entry) -> BackendResult<Entry> {
        let name = entry.name.clone();
        // the API server rejects the write with 409 if metadata.resourceVersion is stale
        self.api
            .replace(&name, &PostParams::default(), &entry_to_config_map(entry))
            .await
            .map(config_map_to_entry)
            .map_err(|e| classify(&name, e))
    }

    async fn delete(&self, name: &str, preconditions: &DeletePreconditions) -> BackendResult<Entry> {
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                resource_version: preconditions.resource_version.clone(),
                uid: preconditions.uid.clone(),
            }),
            ..Default::default()
        };

        match self.api.delete(name, &params).await.map_err(|e| classify(name, e))? {
            Either::Left(config_map) => Ok(config_map_to_entry(config_map)),
            Either::Right(status) => {
                debug!(event = "ConfigMapDeleted", name = name, status = ?status.status);
                Ok(Entry {
                    name: name.to_string(),
                    ..Default::default()
                })
            }
        }
    }

    async fn list(&self, selector: &Selector) -> BackendResult<EntryList> {
        let list = self
            .api
            .list(&ListParams::default().labels_from(selector))
            .await
            .map_err(BackendError::from)?;

        Ok(EntryList {
            resource_version: list.metadata.resource_version,
            items: list.items.into_iter().map(config_map_to_entry).collect(),
        })
    }

    async fn watch(&self, selector: &Selector) -> BackendResult<Option<EntryEventStream>> {
        let config = watcher::Config::default().labels_from(selector);

        // The watcher re-lists on its own after desyncs; a re-list is surfaced
        // as a fresh snapshot so consumers can diff against what they have.
        let mut pending: HashMap<String, Entry> = HashMap::new();
        let stream = watcher(self.api.clone(), config)
            .default_backoff()
            .map_err(|e| BackendError::Watch(e.to_string()))
            .filter_map(move |event| {
                let translated = match event {
                    Ok(watcher::Event::Init) => {
                        pending.clear();
                        None
                    }
                    Ok(watcher::Event::InitApply(config_map)) => {
                        let entry = config_map_to_entry(config_map);
                        pending.insert(entry.name.clone(), entry);
                        None
                    }
                    Ok(watcher::Event::InitDone) => {
                        let mut items: Vec<Entry> = pending.drain().map(|(_, entry)| entry).collect();
                        items.sort_by(|a, b| a.name.cmp(&b.name));
                        Some(Ok(EntryEvent::Snapshot(EntryList { resource_version: None, items })))
                    }
                    Ok(watcher::Event::Apply(config_map)) => Some(Ok(EntryEvent::Applied(config_map_to_entry(config_map)))),
                    Ok(watcher::Event::Delete(config_map)) => Some(Ok(EntryEvent::Deleted(config_map_to_entry(config_map)))),
                    Err(err) => Some(Err(err)),
                };
                futures::future::ready(translated)
            })
            .boxed();

        Ok(Some(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_round_trip_through_config_map() {
        let entry = Entry::new(
            "tidb-config-default-cluster1",
            BTreeMap::from([("aba.pingcap.com/kind".to_string(), "config".to_string())]),
            br#"{"spec":{"replicas":3}}"#.to_vec(),
        )
        .with_annotation("aba.pingcap.com/ttl", "30".to_string())
        .with_resource_version(Some("7".to_string()));

        let config_map = entry_to_config_map(entry.clone());
        assert_eq!(config_map.metadata.name.as_deref(), Some("tidb-config-default-cluster1"));
        assert_eq!(
            config_map.data.as_ref().and_then(|d| d.get(PAYLOAD_KEY)).map(String::as_str),
            Some(r#"{"spec":{"replicas":3}}"#)
        );
        assert!(config_map.binary_data.is_none());

        assert_eq!(config_map_to_entry(config_map), entry);
    }

    #[test]
    fn test_binary_payload_uses_binary_data() {
        let entry = Entry::new("bin", BTreeMap::new(), vec![0xff, 0x00, 0xfe]);

        let config_map = entry_to_config_map(entry.clone());
        assert!(config_map.data.is_none());
        assert!(config_map.metadata.annotations.is_none());

        let decoded = config_map_to_entry(config_map);
        assert_eq!(decoded.payload, vec![0xff, 0x00, 0xfe]);
    }
}
