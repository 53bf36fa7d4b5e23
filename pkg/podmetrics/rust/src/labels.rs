// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Pod label resolution.
//!
//! [`LabelCache`] keeps a pod name -> labels index current by consuming a pod
//! watch stream on a background task. Lookups take a shared lock and clone an
//! `Arc`, so they never wait on the watch itself. [`DisabledLabels`] is used
//! when label enrichment is turned off.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long [`LabelCache::start`] waits for the initial pod listing.
pub const INITIAL_SYNC_GRACE: Duration = Duration::from_secs(1);

/// Labels of one pod. Cheap to clone; never mutated once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodLabels(Arc<BTreeMap<String, String>>);

impl PodLabels {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(Arc::new(labels))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for PodLabels {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self::new(labels)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PodLabels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolves a pod name to its current labels.
pub trait LabelResolver: Send + Sync {
    /// Returns the best known labels for `pod_name`, or empty labels when the
    /// pod is unknown. Never blocks on the watch.
    fn resolve(&self, pod_name: &str) -> PodLabels;
}

/// Resolver used when label enrichment is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLabels;

impl LabelResolver for DisabledLabels {
    fn resolve(&self, _pod_name: &str) -> PodLabels {
        PodLabels::empty()
    }
}

/// One change observed on the pod watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelEvent {
    /// A pod was added or updated.
    Applied { pod_name: String, labels: PodLabels },
    /// A pod was deleted.
    Deleted { pod_name: String },
    /// A full listing is starting; the entries that follow replace the index.
    RelistStarted,
    /// A pod that is part of the current full listing.
    RelistApplied { pod_name: String, labels: PodLabels },
    /// The full listing is complete.
    RelistDone,
}

#[derive(Debug, Default)]
struct CacheState {
    labels: HashMap<String, PodLabels>,
    /// Listing in progress, swapped into `labels` when it completes.
    relist: Option<HashMap<String, PodLabels>>,
}

struct Inner {
    state: RwLock<CacheState>,
    synced: watch::Sender<bool>,
}

/// Pod name -> labels index fed by a pod watch.
#[derive(Clone)]
pub struct LabelCache {
    inner: Arc<Inner>,
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelCache {
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(CacheState::default()),
                synced,
            }),
        }
    }

    /// Spawns the watch consumer and waits up to `grace` for the first full
    /// listing to be applied.
    ///
    /// Returning does not guarantee the cache is populated; callers that need
    /// certainty should await [`LabelCache::ready`].
    pub async fn start<S, E>(events: S, grace: Duration) -> (Self, JoinHandle<()>)
    where
        S: Stream<Item = Result<LabelEvent, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cache = Self::new();
        let handle = cache.spawn_watch(events);

        match tokio::time::timeout(grace, cache.ready()).await {
            Ok(()) => info!(pods = cache.len(), "Initial pod labels loaded"),
            Err(_) => warn!(
                grace_ms = grace.as_millis() as u64,
                pods = cache.len(),
                "Initial pod listing not complete, continuing with partial labels"
            ),
        }

        (cache, handle)
    }

    /// Runs the single writer for this cache until `events` ends.
    ///
    /// Stream errors are logged and the stream is polled again; reconnecting
    /// is the stream's responsibility.
    pub fn spawn_watch<S, E>(&self, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = Result<LabelEvent, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut events = std::pin::pin!(events);
            info!("Watching for pod label changes");
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => cache.apply(event),
                    Err(e) => warn!(error = %e, "Pod label watch error"),
                }
            }
            error!("Pod label watch stream ended");
        })
    }

    /// Applies one watch event.
    pub fn apply(&self, event: LabelEvent) {
        let mut state = self.write();
        match event {
            LabelEvent::Applied { pod_name, labels } => {
                debug!(pod = %pod_name, labels = labels.len(), "Pod labels applied");
                if let Some(relist) = state.relist.as_mut() {
                    relist.insert(pod_name.clone(), labels.clone());
                }
                state.labels.insert(pod_name, labels);
            }
            LabelEvent::Deleted { pod_name } => {
                debug!(pod = %pod_name, "Pod deleted");
                if let Some(relist) = state.relist.as_mut() {
                    relist.remove(&pod_name);
                }
                state.labels.remove(&pod_name);
            }
            LabelEvent::RelistStarted => {
                debug!("Pod listing started");
                state.relist = Some(HashMap::new());
            }
            LabelEvent::RelistApplied { pod_name, labels } => match state.relist.as_mut() {
                Some(relist) => {
                    relist.insert(pod_name, labels);
                }
                None => {
                    state.labels.insert(pod_name, labels);
                }
            },
            LabelEvent::RelistDone => {
                if let Some(relist) = state.relist.take() {
                    state.labels = relist;
                }
                debug!(pods = state.labels.len(), "Pod listing done");
                drop(state);
                self.inner.synced.send_if_modified(|synced| !std::mem::replace(synced, true));
            }
        }
    }

    /// Whether a full pod listing has been applied at least once.
    pub fn is_ready(&self) -> bool {
        *self.inner.synced.borrow()
    }

    /// Completes once a full pod listing has been applied.
    pub async fn ready(&self) {
        let mut synced = self.inner.synced.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = synced.wait_for(|synced| *synced).await;
    }

    /// Number of pods currently known.
    pub fn len(&self) -> usize {
        self.read().labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LabelResolver for LabelCache {
    fn resolve(&self, pod_name: &str) -> PodLabels {
        self.read().labels.get(pod_name).cloned().unwrap_or_default()
    }
}
