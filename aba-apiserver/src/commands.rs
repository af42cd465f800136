// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::io;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::signal;

use aba_common::telemetry::{info, warn};
use aba_storage::api::strategy::{default_tidb_config, validate_tidb_config, FieldError};
use aba_storage::api::v1alpha1::tidb_config::TidbConfig;
use aba_storage::key::ObjectKey;
use aba_storage::predicate::SelectionPredicate;
use aba_storage::versioner::Preconditions;
use aba_storage::{EntryStore, Event, StorageError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to print object: {0}")]
    Print(#[from] serde_yaml::Error),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CommandResult<T> = Result<T, CommandError>;

type Store = EntryStore<TidbConfig>;

fn joined(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn print_object<K: Serialize>(object: &K) -> CommandResult<()> {
    print!("{}", serde_yaml::to_string(object)?);
    Ok(())
}

fn event_line(event: &Event<TidbConfig>) -> String {
    let kind = match event {
        Event::Added(_) => "ADDED",
        Event::Modified(_) => "MODIFIED",
        Event::Deleted(_) => "DELETED",
    };
    let meta = &event.object().metadata;
    format!(
        "{:<9}{}/{}\t{}",
        kind,
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or_default(),
        meta.resource_version.as_deref().unwrap_or_default()
    )
}

pub async fn get(store: &Store, key: &str, resource_version: &str, ignore_not_found: bool) -> CommandResult<()> {
    let object = store.get(key, resource_version, ignore_not_found).await?;
    print_object(&object)
}

pub async fn list(store: &Store, prefix: &str, selector: &str, field_selector: &str) -> CommandResult<()> {
    let predicate = SelectionPredicate::parse(selector, field_selector)?;
    let list = store.list(prefix, "", &predicate).await?;

    info!(
        event = "Listed",
        prefix = prefix,
        items = list.len(),
        resource_version = list.resource_version.as_deref().unwrap_or_default()
    );
    for (i, object) in list.iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        print_object(object)?;
    }
    Ok(())
}

pub async fn count(store: &Store, prefix: &str) -> CommandResult<()> {
    println!("{}", store.count(prefix).await?);
    Ok(())
}

pub async fn create(store: &Store, path: &str, ttl: Option<u64>) -> CommandResult<()> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| CommandError::Read {
        path: path.to_string(),
        source,
    })?;
    let mut config: TidbConfig = serde_yaml::from_str(&raw).map_err(|source| CommandError::Parse {
        path: path.to_string(),
        source,
    })?;

    default_tidb_config(&mut config);
    let errors = validate_tidb_config(&config);
    if !errors.is_empty() {
        return Err(CommandError::Invalid(joined(&errors)));
    }

    let key = ObjectKey::for_object(&config)?;
    let created = store.create(&key.to_string(), &config, ttl).await?;
    print_object(&created)
}

pub async fn delete(store: &Store, key: &str, uid: Option<&str>) -> CommandResult<()> {
    let preconditions = uid.map(Preconditions::uid);
    let deleted = store.delete(key, preconditions.as_ref()).await?;
    print_object(&deleted)
}

pub async fn scale(store: &Store, key: &str, replicas: i32) -> CommandResult<()> {
    let updated = store
        .guaranteed_update(
            key,
            false,
            None,
            |mut current: TidbConfig, _| {
                current.spec.replicas = replicas;
                let errors = validate_tidb_config(&current);
                if !errors.is_empty() {
                    anyhow::bail!(joined(&errors));
                }
                Ok((current, None))
            },
            None,
        )
        .await?;
    print_object(&updated)
}

/// Print events until the watch ends or SIGINT arrives
pub async fn watch(store: &Store, target: &str, resource_version: &str, selector: &str) -> CommandResult<()> {
    let predicate = SelectionPredicate::parse(selector, "")?;
    let mut stream = match ObjectKey::parse(target) {
        Ok(_) => store.watch(target, resource_version, predicate)?,
        Err(_) => store.watch_list(target, resource_version, predicate)?,
    };

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                stream.stop();
                break;
            },
            next = stream.next() => match next {
                Some(Ok(event)) => println!("{}", event_line(&event)),
                Some(Err(e)) => warn!(event = "WatchError", target = target, error = %e),
                None => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aba_common::config::StorageConfig;
    use aba_storage::api::v1alpha1::tidb_config::TidbConfigSpec;
    use aba_storage::backend::memory::MemoryBackend;

    use super::*;

    fn store() -> Store {
        EntryStore::new(Arc::new(MemoryBackend::new()), &StorageConfig::default())
    }

    #[test]
    fn test_event_line() {
        let mut object = TidbConfig::new("cluster1", TidbConfigSpec { replicas: 3 });
        object.metadata.resource_version = Some("7".to_string());

        assert_eq!(event_line(&Event::Modified(object)), "MODIFIED default/cluster1\t7");
    }

    #[tokio::test]
    async fn test_create_from_file_defaults_and_keys_object() {
        let dir = tempfile::tempdir().expect("temp dir created");
        let path = dir.path().join("cluster1.yaml");
        tokio::fs::write(
            &path,
            "apiVersion: tidb/v1alpha1\nkind: TidbConfig\nmetadata:\n  name: cluster1\n  namespace: prod\nspec: {}\n",
        )
        .await
        .expect("written");

        let store = store();
        create(&store, path.to_str().unwrap_or_default(), None).await.expect("created");

        let stored = store.get("/tidb/tidbconfigs/prod/cluster1", "", false).await.expect("found");
        assert_eq!(stored.spec.replicas, 1);
    }

    #[tokio::test]
    async fn test_scale_refuses_invalid_replicas() {
        let store = store();
        store
            .create(
                "/tidb/tidbconfigs/default/cluster1",
                &TidbConfig::new("cluster1", TidbConfigSpec { replicas: 1 }),
                None,
            )
            .await
            .expect("created");

        let err = scale(&store, "/tidb/tidbconfigs/default/cluster1", -3).await.expect_err("negative");
        assert!(matches!(err, CommandError::Storage(StorageError::UpdateFunc(_))));

        scale(&store, "/tidb/tidbconfigs/default/cluster1", 5).await.expect("scaled");
        let stored = store.get("/tidb/tidbconfigs/default/cluster1", "", false).await.expect("found");
        assert_eq!(stored.spec.replicas, 5);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = create(&store(), "/nonexistent/cluster.yaml", None).await.expect_err("no file");
        assert!(matches!(err, CommandError::Read { .. }));
    }
}
