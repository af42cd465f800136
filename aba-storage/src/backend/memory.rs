// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{BackendResult, DeletePreconditions, Entry, EntryBackend, EntryList, Selector, SelectorExt};
use crate::error::BackendError;

/// Process local backend. Every write bumps one global revision, the same way
/// a Kubernetes API server stamps resource versions from etcd.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    revision: u64,
    entries: BTreeMap<String, Entry>,
}

impl MemoryState {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current global revision
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EntryBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, mut entry: Entry) -> BackendResult<Entry> {
        let mut state = self.state.write().await;
        if state.entries.contains_key(&entry.name) {
            return Err(BackendError::AlreadyExists(entry.name));
        }

        let revision = state.next_revision();
        entry.uid = Some(format!("memory-{}", revision));
        entry.resource_version = Some(revision);
        state.entries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(&self, name: &str) -> BackendResult<Option<Entry>> {
        Ok(self.state.read().await.entries.get(name).cloned())
    }

    async fn replace(&self, mut entry: Entry) -> BackendResult<Entry> {
        let mut state = self.state.write().await;
        let current = state
            .entries
            .get(&entry.name)
            .ok_or_else(|| BackendError::NotFound(entry.name.clone()))?;

        if entry.resource_version.is_some() && entry.resource_version != current.resource_version {
            return Err(BackendError::Conflict(entry.name));
        }

        entry.uid = current.uid.clone();
        entry.resource_version = Some(state.next_revision());
        state.entries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, name: &str, preconditions: &DeletePreconditions) -> BackendResult<Entry> {
        let mut state = self.state.write().await;
        let current = state
            .entries
            .get(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;

        let version_matches = preconditions
            .resource_version
            .as_ref()
            .is_none_or(|rv| current.resource_version.as_ref() == Some(rv));
        let uid_matches = preconditions
            .uid
            .as_ref()
            .is_none_or(|uid| current.uid.as_ref() == Some(uid));
        if !version_matches || !uid_matches {
            return Err(BackendError::Conflict(name.to_string()));
        }

        state.next_revision();
        state
            .entries
            .remove(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    async fn list(&self, selector: &Selector) -> BackendResult<EntryList> {
        let state = self.state.read().await;
        Ok(EntryList {
            resource_version: Some(state.revision.to_string()),
            items: state
                .entries
                .values()
                .filter(|entry| selector.matches(&entry.labels))
                .cloned()
                .collect(),
        })
    }
}
