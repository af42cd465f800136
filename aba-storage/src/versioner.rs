// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use kube::Resource;

use aba_common::telemetry::warn;

use crate::api::ObjectList;
use crate::error::{Result, StorageError};

/// Reads and writes resource versions on objects.
///
/// Versions are the backend's own entry versions, carried as decimal strings
/// in `metadata.resourceVersion`. An empty version is version 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectVersioner {
    strict: bool,
}

impl ObjectVersioner {
    /// With `strict` off, an entry version that can not be stamped onto an
    /// object is logged and the object is handed out unversioned.
    pub fn new(strict: bool) -> Self {
        ObjectVersioner { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn parse_resource_version(&self, resource_version: &str) -> Result<u64> {
        if resource_version.is_empty() {
            return Ok(0);
        }
        resource_version
            .parse::<u64>()
            .map_err(|_| StorageError::InvalidResourceVersion(resource_version.to_string()))
    }

    pub fn object_resource_version<K: Resource>(&self, object: &K) -> Result<u64> {
        self.parse_resource_version(object.meta().resource_version.as_deref().unwrap_or_default())
    }

    pub fn update_object<K: Resource>(&self, object: &mut K, resource_version: u64) {
        object.meta_mut().resource_version = (resource_version != 0).then(|| resource_version.to_string());
    }

    /// Clear fields the backend owns so they never end up in a payload
    pub fn prepare_object_for_storage<K: Resource>(&self, object: &mut K) {
        object.meta_mut().resource_version = None;
    }

    pub fn update_list<K>(&self, list: &mut ObjectList<K>, resource_version: u64) {
        list.resource_version = (resource_version != 0).then(|| resource_version.to_string());
    }

    /// Stamp the version of the entry an object was decoded from
    ///
    /// # Arguments
    /// * `object` - The freshly decoded object
    /// * `entry` - Name of the entry, for diagnostics
    /// * `resource_version` - The entry's version as reported by the backend
    pub fn stamp<K: Resource>(&self, object: &mut K, entry: &str, resource_version: Option<&str>) -> Result<()> {
        let parsed = resource_version
            .ok_or_else(|| StorageError::InvalidResourceVersion(String::new()))
            .and_then(|rv| self.parse_resource_version(rv));

        match parsed {
            Ok(version) => {
                self.update_object(object, version);
                Ok(())
            }
            Err(err) if self.strict => Err(err),
            Err(err) => {
                // the object is still usable without a version
                warn!(event = "VersionStampSkipped", entry = entry, error = %err);
                self.prepare_object_for_storage(object);
                Ok(())
            }
        }
    }
}

/// Conditions the current object has to satisfy before a write goes ahead
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub uid: Option<String>,
    pub resource_version: Option<String>,
}

impl Preconditions {
    pub fn uid(uid: &str) -> Self {
        Preconditions {
            uid: Some(uid.to_string()),
            resource_version: None,
        }
    }

    pub fn resource_version(resource_version: &str) -> Self {
        Preconditions {
            uid: None,
            resource_version: Some(resource_version.to_string()),
        }
    }

    pub fn check<K: Resource>(&self, key: &str, object: &K) -> Result<()> {
        if let Some(uid) = &self.uid {
            let actual = object.meta().uid.as_deref();
            if actual != Some(uid.as_str()) {
                return Err(StorageError::PreconditionFailed {
                    key: key.to_string(),
                    message: format!("UID in precondition: {}, UID in object meta: {}", uid, actual.unwrap_or_default()),
                });
            }
        }
        if let Some(resource_version) = &self.resource_version {
            let actual = object.meta().resource_version.as_deref();
            if actual != Some(resource_version.as_str()) {
                return Err(StorageError::PreconditionFailed {
                    key: key.to_string(),
                    message: format!(
                        "ResourceVersion in precondition: {}, ResourceVersion in object meta: {}",
                        resource_version,
                        actual.unwrap_or_default()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Metadata of the stored entry handed to update functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// TTL recorded on the entry, in seconds
    pub ttl: Option<u64>,
    pub resource_version: u64,
}
