// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Flat key-value backends the store persists entries into.
//!
//! A backend only knows named entries carrying labels and one opaque
//! payload. It has no prefix scan (label selection is the only query), no
//! multi-entry transactions, and change notification is optional.

pub mod configmap;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
pub use kube::core::{Selector, SelectorExt};

use crate::error::BackendError;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A single backend record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub payload: Vec<u8>,
    /// Version assigned by the backend; on writes it is the version the
    /// caller expects to replace
    pub resource_version: Option<String>,
    pub uid: Option<String>,
}

impl Entry {
    pub fn new(name: &str, labels: BTreeMap<String, String>, payload: Vec<u8>) -> Self {
        Entry {
            name: name.to_string(),
            labels,
            payload,
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, key: &str, value: String) -> Self {
        self.annotations.insert(key.to_string(), value);
        self
    }

    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        self.resource_version = resource_version;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryList {
    /// Backend version the listing was taken at
    pub resource_version: Option<String>,
    pub items: Vec<Entry>,
}

/// Conditions a backend delete must check atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePreconditions {
    pub resource_version: Option<String>,
    pub uid: Option<String>,
}

/// Change notification emitted by backends that support it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEvent {
    /// Full state of every selected entry, sent first and after every resync
    Snapshot(EntryList),
    Applied(Entry),
    Deleted(Entry),
}

pub type EntryEventStream = BoxStream<'static, BackendResult<EntryEvent>>;

#[async_trait]
pub trait EntryBackend: Send + Sync {
    /// Human readable backend name used in logs
    fn name(&self) -> &str;

    /// Create an entry, failing with `AlreadyExists` if the name is taken
    async fn create(&self, entry: Entry) -> BackendResult<Entry>;

    async fn get(&self, name: &str) -> BackendResult<Option<Entry>>;

    /// Replace an existing entry. When `entry.resource_version` is set the
    /// write only succeeds if it still matches, otherwise `Conflict`.
    async fn replace(&self, entry: Entry) -> BackendResult<Entry>;

    /// Delete an entry, returning its last state
    async fn delete(&self, name: &str, preconditions: &DeletePreconditions) -> BackendResult<Entry>;

    async fn list(&self, selector: &Selector) -> BackendResult<EntryList>;

    /// Subscribe to changes of the selected entries. `None` means the backend
    /// has no change notification and callers have to poll `list`.
    async fn watch(&self, _selector: &Selector) -> BackendResult<Option<EntryEventStream>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_labels_select_entries() {
        let selector = Selector::from_iter([
            ("a/group".to_string(), "tidb".to_string()),
            ("a/kind".to_string(), "config".to_string()),
        ]);
        let labels = BTreeMap::from([
            ("a/group".to_string(), "tidb".to_string()),
            ("a/kind".to_string(), "config".to_string()),
            ("a/name".to_string(), "x".to_string()),
        ]);

        assert!(selector.matches(&labels));
        assert!(Selector::default().matches(&labels));
        assert!(!selector.matches(&BTreeMap::from([("a/group".to_string(), "tidb".to_string())])));
        assert_eq!(selector.to_string(), "a/group=tidb,a/kind=config");
    }
}
