// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::result;
use thiserror::Error;

/// Failures reported by an entry backend. Only the first three variants are
/// interpreted by the store; everything else is passed through.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("entry {0} was modified concurrently")]
    Conflict(String),
    #[error("backend request failed: {0}")]
    Api(#[from] kube::Error),
    #[error("backend watch failed: {0}")]
    Watch(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("key already exists: {0}")]
    AlreadyExists(String),
    #[error("version conflict on {key}: {message}")]
    VersionConflict { key: String, message: String },
    #[error("precondition failed on {key}: {message}")]
    PreconditionFailed { key: String, message: String },
    #[error("malformed key {0:?}, expected /{{group}}/{{kind}}/{{namespace}}/{{name}}")]
    MalformedKey(String),
    #[error("invalid resource version {0:?}")]
    InvalidResourceVersion(String),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("failed to encode object: {0}")]
    Encode(String),
    #[error("failed to decode entry {name}: {message}")]
    Decode { name: String, message: String },
    #[error("update function failed: {0}")]
    UpdateFunc(#[source] anyhow::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }

    /// Status code a REST layer conventionally answers with for this error
    pub fn http_status(&self) -> u16 {
        match self {
            StorageError::NotFound(_) => 404,
            StorageError::AlreadyExists(_)
            | StorageError::VersionConflict { .. }
            | StorageError::PreconditionFailed { .. } => 409,
            StorageError::MalformedKey(_)
            | StorageError::InvalidResourceVersion(_)
            | StorageError::InvalidSelector(_) => 400,
            _ => 500,
        }
    }

    /// Attach the caller's key to a backend failure
    pub(crate) fn from_backend(key: &str, error: BackendError) -> Self {
        match error {
            BackendError::NotFound(_) => StorageError::NotFound(key.to_string()),
            BackendError::AlreadyExists(_) => StorageError::AlreadyExists(key.to_string()),
            BackendError::Conflict(name) => StorageError::VersionConflict {
                key: key.to_string(),
                message: format!("entry {} changed since it was read", name),
            },
            other => StorageError::Backend(other),
        }
    }
}

pub type Result<T> = result::Result<T, StorageError>;
