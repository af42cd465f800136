// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod strategy;
pub mod v1alpha1;

use kube::Resource;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Objects the store can persist. `Default` provides the zero value handed
/// out for missing keys.
pub trait StoredObject:
    Clone
        + Default
        + Resource<DynamicType = ()>
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static
{}

impl<T> StoredObject for T
where
    T: Clone
        + Default
        + Resource<DynamicType = ()>
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static
{}

/// Typed list of objects returned by list operations
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectList<K> {
    /// Backend version the list was read at
    pub resource_version: Option<String>,
    pub items: Vec<K>,
}

impl<K> Default for ObjectList<K> {
    fn default() -> Self {
        ObjectList {
            resource_version: None,
            items: Vec::new(),
        }
    }
}

impl<K> ObjectList<K> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.items.iter()
    }
}

impl<K> IntoIterator for ObjectList<K> {
    type Item = K;
    type IntoIter = std::vec::IntoIter<K>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
