// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Change notification for stored objects.
//!
//! Each watch runs one background task feeding a bounded channel. The task
//! either subscribes to the backend's own notifications or polls `list`, and
//! both sources go through a [`Tracker`] that turns entry states into object
//! events.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use aba_common::telemetry::{debug, info, warn};

use crate::api::StoredObject;
use crate::backend::{Entry, EntryEvent, EntryList, Selector};
use crate::codec::Codec;
use crate::error::{Result, StorageError};
use crate::key::{KeyPrefix, ObjectKey};
use crate::predicate::SelectionPredicate;
use crate::store::{decode_entry, EntryStore};
use crate::versioner::ObjectVersioner;

#[derive(Debug, Clone, PartialEq)]
pub enum Event<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> Event<K> {
    pub fn object(&self) -> &K {
        match self {
            Event::Added(object) | Event::Modified(object) | Event::Deleted(object) => object,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            Event::Added(object) | Event::Modified(object) | Event::Deleted(object) => object,
        }
    }
}

/// Stream of events of one watch. Dropping it stops the watch.
pub struct WatchStream<K> {
    receiver: mpsc::Receiver<Result<Event<K>>>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl<K> WatchStream<K> {
    /// Stop the watch. Returns immediately, the stream ends once buffered
    /// events are drained.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the background task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<K> Unpin for WatchStream<K> {}

impl<K> Stream for WatchStream<K> {
    type Item = Result<Event<K>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<K> Drop for WatchStream<K> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn entry_version(entry: &Entry) -> u64 {
    entry
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or_default()
}

/// Turns successive entry states into object events
///
/// `matched` holds the last object sent for every entry that currently
/// passes the predicate, `seen` the last version of every selected entry.
struct Tracker<K> {
    codec: Codec,
    versioner: ObjectVersioner,
    predicate: SelectionPredicate<K>,
    start_version: u64,
    synced: bool,
    seen: BTreeMap<String, u64>,
    matched: BTreeMap<String, K>,
}

impl<K: StoredObject> Tracker<K> {
    fn new(
        codec: Codec,
        versioner: ObjectVersioner,
        predicate: SelectionPredicate<K>,
        start_version: u64,
    ) -> Self {
        Tracker {
            codec,
            versioner,
            predicate,
            start_version,
            synced: false,
            seen: BTreeMap::new(),
            matched: BTreeMap::new(),
        }
    }

    fn decode(&self, entry: &Entry) -> Option<K> {
        match decode_entry(&self.codec, &self.versioner, entry) {
            Ok(object) => Some(object),
            Err(err) => {
                warn!(event = "WatchEntrySkipped", entry = entry.name.as_str(), error = %err);
                None
            }
        }
    }

    /// Reconcile against the full state of every selected entry
    fn snapshot(&mut self, list: EntryList) -> Vec<Event<K>> {
        let mut entries = list.items;
        entries.sort_by_key(entry_version);

        let mut events = Vec::new();
        if !self.synced {
            self.synced = true;
            for entry in entries {
                let version = entry_version(&entry);
                self.seen.insert(entry.name.clone(), version);
                let Some(object) = self.decode(&entry) else { continue };
                if !self.predicate.matches(&object) {
                    continue;
                }
                if self.start_version == 0 {
                    events.push(Event::Added(object.clone()));
                } else if version > self.start_version {
                    events.push(Event::Modified(object.clone()));
                }
                self.matched.insert(entry.name, object);
            }
            return events;
        }

        let present: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        for entry in entries {
            events.extend(self.applied(entry));
        }

        let list_version = list
            .resource_version
            .as_deref()
            .and_then(|rv| rv.parse().ok())
            .or_else(|| self.seen.values().max().copied())
            .unwrap_or_default();
        let gone: Vec<String> = self.seen.keys().filter(|name| !present.contains(name)).cloned().collect();
        for name in gone {
            events.extend(self.deleted(&name, None, list_version));
        }
        events
    }

    fn applied(&mut self, entry: Entry) -> Option<Event<K>> {
        let version = entry_version(&entry);
        if version != 0 && self.seen.get(&entry.name) == Some(&version) {
            return None;
        }
        self.seen.insert(entry.name.clone(), version);

        let object = self.decode(&entry)?;
        let matches = self.predicate.matches(&object);
        match (self.matched.contains_key(&entry.name), matches) {
            (false, true) => {
                self.matched.insert(entry.name, object.clone());
                Some(Event::Added(object))
            }
            (true, true) => {
                self.matched.insert(entry.name, object.clone());
                Some(Event::Modified(object))
            }
            (true, false) => {
                self.matched.remove(&entry.name);
                Some(Event::Deleted(object))
            }
            (false, false) => None,
        }
    }

    /// `last` is the final state when the backend reported it
    fn deleted(&mut self, name: &str, last: Option<&Entry>, version: u64) -> Option<Event<K>> {
        self.seen.remove(name);
        let known = self.matched.remove(name)?;

        let object = match last.and_then(|entry| self.decode(entry)) {
            Some(object) => object,
            None => {
                let mut object = known;
                self.versioner.update_object(&mut object, version);
                object
            }
        };
        Some(Event::Deleted(object))
    }

    fn event(&mut self, event: EntryEvent) -> Vec<Event<K>> {
        match event {
            EntryEvent::Snapshot(list) => self.snapshot(list),
            EntryEvent::Applied(entry) => self.applied(entry).into_iter().collect(),
            EntryEvent::Deleted(entry) => {
                let version = entry_version(&entry);
                self.deleted(&entry.name, Some(&entry), version).into_iter().collect()
            }
        }
    }
}

/// Forward an item, giving up when the watch is stopped or nobody listens
async fn emit<K>(
    sender: &mpsc::Sender<Result<Event<K>>>,
    token: &CancellationToken,
    item: Result<Event<K>>,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = sender.send(item) => sent.is_ok(),
    }
}

impl<K: StoredObject> EntryStore<K> {
    /// Watch the object under `key`
    pub fn watch(
        &self,
        key: &str,
        resource_version: &str,
        predicate: SelectionPredicate<K>,
    ) -> Result<WatchStream<K>> {
        let object_key = ObjectKey::parse(key)?;
        self.start_watch(key, object_key.selector(), resource_version, predicate)
    }

    /// Watch every object under `prefix`
    pub fn watch_list(
        &self,
        prefix: &str,
        resource_version: &str,
        predicate: SelectionPredicate<K>,
    ) -> Result<WatchStream<K>> {
        let key_prefix = KeyPrefix::parse(prefix)?;
        self.start_watch(prefix, key_prefix.selector(), resource_version, predicate)
    }

    fn start_watch(
        &self,
        target: &str,
        selector: Selector,
        resource_version: &str,
        predicate: SelectionPredicate<K>,
    ) -> Result<WatchStream<K>> {
        let start_version = self.versioner.parse_resource_version(resource_version)?;
        let tracker = Tracker::new(self.codec, self.versioner, predicate, start_version);

        let (sender, receiver) = mpsc::channel(self.watch.channel_capacity.max(1));
        let token = CancellationToken::new();

        let store = self.clone();
        let target = target.to_string();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            info!(event = "WatchStarted", target = target.as_str(), resource_version = start_version);
            store.run_watch(&target, selector, tracker, sender, task_token).await;
            info!(event = "WatchStopped", target = target.as_str());
        });

        Ok(WatchStream { receiver, token, task })
    }

    async fn run_watch(
        &self,
        target: &str,
        selector: Selector,
        mut tracker: Tracker<K>,
        sender: mpsc::Sender<Result<Event<K>>>,
        token: CancellationToken,
    ) {
        if self.watch.native {
            let subscribed = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                subscribed = self.backend.watch(&selector) => subscribed,
            };
            match subscribed {
                Ok(Some(mut events)) => {
                    debug!(event = "WatchSource", target = target, source = "native");
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = token.cancelled() => return,
                            next = events.next() => next,
                        };
                        let items: Vec<Result<Event<K>>> = match next {
                            Some(Ok(event)) => tracker.event(event).into_iter().map(Ok).collect(),
                            // the subscription retries by itself
                            Some(Err(err)) => vec![Err(StorageError::from_backend(target, err))],
                            None => return,
                        };
                        for item in items {
                            if !emit(&sender, &token, item).await {
                                return;
                            }
                        }
                    }
                }
                Ok(None) => (),
                Err(err) => {
                    warn!(event = "NativeWatchUnavailable", target = target, error = %err);
                }
            }
        }

        debug!(event = "WatchSource", target = target, source = "poll");
        let mut interval = tokio::time::interval(Duration::from_millis(self.watch.poll_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = interval.tick() => (),
            }
            let listed = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                listed = self.backend.list(&selector) => listed,
            };
            let items: Vec<Result<Event<K>>> = match listed {
                Ok(list) => tracker.snapshot(list).into_iter().map(Ok).collect(),
                Err(err) => vec![Err(StorageError::from_backend(target, err))],
            };
            for item in items {
                if !emit(&sender, &token, item).await {
                    return;
                }
            }
        }
    }
}
